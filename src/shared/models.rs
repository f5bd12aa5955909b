use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::enums::{CommentType, NotificationType, TicketStatus, UserRole, VoteType};
use crate::shared::schema::{
    auth_sessions, categories, notifications, priorities, ticket_activities, ticket_attachments,
    ticket_comments, ticket_sequences, ticket_votes, tickets, users,
};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub is_active: bool,
    pub email_notifications: bool,
    pub sms_notifications: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Display name used in activity descriptions and notification bodies:
    /// full name when present, username otherwise.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = auth_sessions)]
pub struct AuthSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = categories)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub color: String,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = priorities)]
pub struct Priority {
    pub id: Uuid,
    pub name: String,
    pub level: i32,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

impl Priority {
    pub fn is_urgent(&self) -> bool {
        self.name == "urgent" || self.level >= 4
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = ticket_sequences)]
pub struct TicketSequence {
    pub prefix: String,
    pub last_number: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub category_id: Uuid,
    pub priority_id: Uuid,
    pub upvotes: i32,
    pub downvotes: i32,
    pub is_internal: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_comments)]
pub struct TicketComment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub created_by: Uuid,
    pub comment_type: CommentType,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_attachments)]
pub struct TicketAttachment {
    pub id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub stored_name: String,
    pub original_filename: String,
    pub file_size: i64,
    pub content_type: String,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TicketAttachment {
    /// An attachment belongs to exactly one of {ticket, comment}.
    pub fn parent_is_valid(&self) -> bool {
        self.ticket_id.is_some() != self.comment_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_votes)]
pub struct TicketVote {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub vote_type: VoteType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_activities)]
pub struct TicketActivity {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub description: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(ticket: Option<Uuid>, comment: Option<Uuid>) -> TicketAttachment {
        TicketAttachment {
            id: Uuid::new_v4(),
            ticket_id: ticket,
            comment_id: comment,
            stored_name: "stored".into(),
            original_filename: "report.pdf".into(),
            file_size: 1024,
            content_type: "application/pdf".into(),
            uploaded_by: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn attachment_parent_must_be_exactly_one() {
        assert!(attachment(Some(Uuid::new_v4()), None).parent_is_valid());
        assert!(attachment(None, Some(Uuid::new_v4())).parent_is_valid());
        assert!(!attachment(None, None).parent_is_valid());
        assert!(!attachment(Some(Uuid::new_v4()), Some(Uuid::new_v4())).parent_is_valid());
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let mut user = User {
            id: Uuid::new_v4(),
            username: "jdoe".into(),
            email: "jdoe@example.com".into(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            role: UserRole::Customer,
            phone: None,
            department: None,
            is_active: true,
            email_notifications: true,
            sms_notifications: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(user.display_name(), "jdoe");
        user.first_name = "Jane".into();
        user.last_name = "Doe".into();
        assert_eq!(user.display_name(), "Jane Doe");
    }

    #[test]
    fn urgent_classification_uses_level_or_name() {
        let urgent = Priority {
            id: Uuid::new_v4(),
            name: "urgent".into(),
            level: 4,
            color: "#6B7280".into(),
            created_at: Utc::now(),
        };
        let low = Priority {
            id: Uuid::new_v4(),
            name: "low".into(),
            level: 1,
            color: "#6B7280".into(),
            created_at: Utc::now(),
        };
        assert!(urgent.is_urgent());
        assert!(!low.is_urgent());
    }
}
