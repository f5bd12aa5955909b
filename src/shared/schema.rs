diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        email -> Varchar,
        password_hash -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        role -> Varchar,
        phone -> Nullable<Varchar>,
        department -> Nullable<Varchar>,
        is_active -> Bool,
        email_notifications -> Bool,
        sms_notifications -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    auth_sessions (id) {
        id -> Uuid,
        user_id -> Uuid,
        created_at -> Timestamptz,
        expires_at -> Timestamptz,
    }
}

diesel::table! {
    categories (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Text,
        color -> Varchar,
        is_active -> Bool,
        created_by -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    priorities (id) {
        id -> Uuid,
        name -> Varchar,
        level -> Int4,
        color -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_sequences (prefix) {
        prefix -> Varchar,
        last_number -> Int8,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        ticket_number -> Varchar,
        subject -> Varchar,
        description -> Text,
        status -> Varchar,
        created_by -> Uuid,
        assigned_to -> Nullable<Uuid>,
        category_id -> Uuid,
        priority_id -> Uuid,
        upvotes -> Int4,
        downvotes -> Int4,
        is_internal -> Bool,
        tags -> Array<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        resolved_at -> Nullable<Timestamptz>,
        closed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        created_by -> Uuid,
        comment_type -> Varchar,
        content -> Text,
        is_internal -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_attachments (id) {
        id -> Uuid,
        ticket_id -> Nullable<Uuid>,
        comment_id -> Nullable<Uuid>,
        stored_name -> Varchar,
        original_filename -> Varchar,
        file_size -> Int8,
        content_type -> Varchar,
        uploaded_by -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_votes (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        user_id -> Uuid,
        vote_type -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_activities (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        user_id -> Uuid,
        action -> Varchar,
        description -> Text,
        old_value -> Nullable<Text>,
        new_value -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    notifications (id) {
        id -> Uuid,
        user_id -> Uuid,
        ticket_id -> Uuid,
        notification_type -> Varchar,
        title -> Varchar,
        message -> Text,
        is_read -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    users,
    auth_sessions,
    categories,
    priorities,
    ticket_sequences,
    tickets,
    ticket_comments,
    ticket_attachments,
    ticket_votes,
    ticket_activities,
    notifications,
);
