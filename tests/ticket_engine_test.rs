mod ticket_engine_integration_tests {
    use chrono::Utc;
    use diesel::prelude::*;
    use diesel::Connection;
    use diesel_migrations::MigrationHarness;
    use uuid::Uuid;

    use deskserver::config::AppConfig;
    use deskserver::shared::enums::{
        CommentType, NotificationType, TicketStatus, UserRole, VoteType,
    };
    use deskserver::shared::models::{Category, Priority, Ticket, User};
    use deskserver::shared::schema::{
        categories, notifications, priorities, ticket_activities, users,
    };
    use deskserver::tickets::engine::{self, NewTicketInput, TicketPatch, VoteOutcome};
    use deskserver::MIGRATIONS;

    // Tests run against the database in DATABASE_URL and skip when it is
    // not reachable.
    fn test_conn() -> Option<PgConnection> {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://deskserver:@localhost:5432/deskserver".to_string());
        let mut conn = match PgConnection::establish(&url) {
            Ok(conn) => conn,
            Err(_) => {
                println!("Skipping test - Postgres not available");
                return None;
            }
        };
        conn.run_pending_migrations(MIGRATIONS).ok()?;
        Some(conn)
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::from_env();
        config.email_notifications_enabled = false;
        config
    }

    fn insert_user(conn: &mut PgConnection, role: UserRole) -> User {
        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let user = User {
            id: Uuid::new_v4(),
            username: format!("user-{suffix}"),
            email: format!("user-{suffix}@example.com"),
            password_hash: "x".into(),
            first_name: String::new(),
            last_name: String::new(),
            role,
            phone: None,
            department: None,
            is_active: true,
            email_notifications: true,
            sms_notifications: false,
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(users::table)
            .values(&user)
            .execute(conn)
            .expect("insert user");
        user
    }

    fn insert_category(conn: &mut PgConnection, created_by: Uuid) -> Category {
        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            name: format!("cat-{}", Uuid::new_v4().simple()),
            description: String::new(),
            color: "#6B7280".into(),
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(categories::table)
            .values(&category)
            .execute(conn)
            .expect("insert category");
        category
    }

    fn any_priority(conn: &mut PgConnection) -> Priority {
        priorities::table
            .order(priorities::level.asc())
            .first(conn)
            .expect("seeded priority")
    }

    fn make_ticket(conn: &mut PgConnection, config: &AppConfig, actor: &User) -> Ticket {
        let category = insert_category(conn, actor.id);
        let priority = any_priority(conn);
        engine::create_ticket(
            conn,
            config,
            NewTicketInput {
                subject: "Cannot login".into(),
                description: "Login fails with a 500".into(),
                category_id: category.id,
                priority_id: priority.id,
                tags: vec![],
                is_internal: false,
            },
            actor,
        )
        .expect("create ticket")
        .value
    }

    #[test]
    fn ticket_numbers_are_unique_and_increasing() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let actor = insert_user(&mut conn, UserRole::Customer);

        let first = make_ticket(&mut conn, &config, &actor);
        let second = make_ticket(&mut conn, &config, &actor);

        assert_ne!(first.ticket_number, second.ticket_number);
        let parse = |t: &Ticket| -> i64 {
            t.ticket_number
                .rsplit('-')
                .next()
                .and_then(|n| n.parse().ok())
                .expect("numeric suffix")
        };
        assert!(parse(&second) > parse(&first));
        assert!(first.ticket_number.starts_with(&config.ticket_prefix));
    }

    #[test]
    fn concurrent_creations_never_share_a_number() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let actor = insert_user(&mut conn, UserRole::Customer);
        let category = insert_category(&mut conn, actor.id);
        let priority = any_priority(&mut conn);

        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://deskserver:@localhost:5432/deskserver".to_string());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let url = url.clone();
                let config = config.clone();
                let actor = actor.clone();
                let category_id = category.id;
                let priority_id = priority.id;
                std::thread::spawn(move || {
                    let mut conn = PgConnection::establish(&url).expect("worker connection");
                    engine::create_ticket(
                        &mut conn,
                        &config,
                        NewTicketInput {
                            subject: format!("Concurrent ticket {i}"),
                            description: "racing".into(),
                            category_id,
                            priority_id,
                            tags: vec![],
                            is_internal: false,
                        },
                        &actor,
                    )
                    .expect("create ticket")
                    .value
                    .ticket_number
                })
            })
            .collect();

        let mut numbers: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect();
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 8);
    }

    #[test]
    fn vote_toggles_and_counters_follow_the_rows() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let actor = insert_user(&mut conn, UserRole::Customer);
        let voter = insert_user(&mut conn, UserRole::Customer);
        let ticket = make_ticket(&mut conn, &config, &actor);

        let outcome = engine::vote(&mut conn, ticket.id, voter.id, VoteType::Up).unwrap();
        assert_eq!(outcome, VoteOutcome::Recorded(VoteType::Up));

        let outcome = engine::vote(&mut conn, ticket.id, voter.id, VoteType::Down).unwrap();
        assert_eq!(outcome, VoteOutcome::Recorded(VoteType::Down));

        let outcome = engine::vote(&mut conn, ticket.id, voter.id, VoteType::Down).unwrap();
        assert_eq!(outcome, VoteOutcome::Removed);

        let reloaded: Ticket = deskserver::shared::schema::tickets::table
            .filter(deskserver::shared::schema::tickets::id.eq(ticket.id))
            .first(&mut conn)
            .unwrap();
        assert_eq!((reloaded.upvotes, reloaded.downvotes), (0, 0));
    }

    #[test]
    fn concurrent_votes_leave_counters_matching_the_rows() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let actor = insert_user(&mut conn, UserRole::Customer);
        let ticket = make_ticket(&mut conn, &config, &actor);

        let voters: Vec<User> = (0..16)
            .map(|_| insert_user(&mut conn, UserRole::Customer))
            .collect();

        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://deskserver:@localhost:5432/deskserver".to_string());
        let handles: Vec<_> = voters
            .into_iter()
            .map(|voter| {
                let url = url.clone();
                let ticket_id = ticket.id;
                std::thread::spawn(move || {
                    let mut conn = PgConnection::establish(&url).expect("worker connection");
                    engine::vote(&mut conn, ticket_id, voter.id, VoteType::Up).expect("vote")
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(
                handle.join().expect("worker panicked"),
                VoteOutcome::Recorded(VoteType::Up)
            );
        }

        let reloaded: Ticket = deskserver::shared::schema::tickets::table
            .filter(deskserver::shared::schema::tickets::id.eq(ticket.id))
            .first(&mut conn)
            .unwrap();
        let rows: i64 = deskserver::shared::schema::ticket_votes::table
            .filter(deskserver::shared::schema::ticket_votes::ticket_id.eq(ticket.id))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(rows, 16);
        assert_eq!((reloaded.upvotes, reloaded.downvotes), (16, 0));
    }

    #[test]
    fn assignment_notifies_agent_and_owner_once_each() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let owner = insert_user(&mut conn, UserRole::Customer);
        let agent = insert_user(&mut conn, UserRole::Agent);
        let admin = insert_user(&mut conn, UserRole::Admin);
        let ticket = make_ticket(&mut conn, &config, &owner);

        engine::assign_ticket(&mut conn, &config, ticket.clone(), &agent, &admin).unwrap();

        let assigned: Vec<Uuid> = notifications::table
            .filter(notifications::ticket_id.eq(ticket.id))
            .filter(notifications::notification_type.eq(NotificationType::TicketAssigned))
            .select(notifications::user_id)
            .load(&mut conn)
            .unwrap();
        assert_eq!(assigned, vec![agent.id]);

        let updated: Vec<Uuid> = notifications::table
            .filter(notifications::ticket_id.eq(ticket.id))
            .filter(notifications::notification_type.eq(NotificationType::TicketUpdated))
            .select(notifications::user_id)
            .load(&mut conn)
            .unwrap();
        assert_eq!(updated, vec![owner.id]);

        let assigned_activities: Vec<Option<String>> = ticket_activities::table
            .filter(ticket_activities::ticket_id.eq(ticket.id))
            .filter(ticket_activities::action.eq("assigned"))
            .select(ticket_activities::new_value)
            .load(&mut conn)
            .unwrap();
        assert_eq!(assigned_activities, vec![Some(agent.username.clone())]);
    }

    #[test]
    fn comment_auto_transition_notifies_owner_not_actor() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let owner = insert_user(&mut conn, UserRole::Customer);
        let agent = insert_user(&mut conn, UserRole::Agent);
        let ticket = make_ticket(&mut conn, &config, &owner);

        engine::add_comment(
            &mut conn,
            &config,
            ticket.clone(),
            "On it".into(),
            CommentType::Comment,
            false,
            &agent,
        )
        .unwrap();

        let status_changed: Vec<Uuid> = notifications::table
            .filter(notifications::ticket_id.eq(ticket.id))
            .filter(notifications::notification_type.eq(NotificationType::StatusChanged))
            .select(notifications::user_id)
            .load(&mut conn)
            .unwrap();
        assert_eq!(status_changed, vec![owner.id]);

        let comment_added: Vec<Uuid> = notifications::table
            .filter(notifications::ticket_id.eq(ticket.id))
            .filter(notifications::notification_type.eq(NotificationType::CommentAdded))
            .select(notifications::user_id)
            .load(&mut conn)
            .unwrap();
        assert_eq!(comment_added, vec![owner.id]);

        let to_actor: i64 = notifications::table
            .filter(notifications::ticket_id.eq(ticket.id))
            .filter(notifications::user_id.eq(agent.id))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(to_actor, 0);
    }

    #[test]
    fn resolved_at_is_stamped_once() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let agent = insert_user(&mut conn, UserRole::Agent);
        let ticket = make_ticket(&mut conn, &config, &agent);

        let resolved = engine::update_ticket(
            &mut conn,
            &config,
            ticket,
            TicketPatch::status_only(TicketStatus::Resolved),
            &agent,
        )
        .unwrap()
        .value;
        let first_stamp = resolved.resolved_at.expect("stamped on resolve");

        let reopened = engine::update_ticket(
            &mut conn,
            &config,
            resolved,
            TicketPatch::status_only(TicketStatus::Open),
            &agent,
        )
        .unwrap()
        .value;
        assert_eq!(reopened.resolved_at, Some(first_stamp));

        let resolved_again = engine::update_ticket(
            &mut conn,
            &config,
            reopened,
            TicketPatch::status_only(TicketStatus::Resolved),
            &agent,
        )
        .unwrap()
        .value;
        assert_eq!(resolved_again.resolved_at, Some(first_stamp));
    }

    #[test]
    fn unchanged_update_writes_no_activity() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let actor = insert_user(&mut conn, UserRole::Customer);
        let ticket = make_ticket(&mut conn, &config, &actor);

        let before: i64 = ticket_activities::table
            .filter(ticket_activities::ticket_id.eq(ticket.id))
            .count()
            .get_result(&mut conn)
            .unwrap();

        let patch = TicketPatch {
            subject: Some(ticket.subject.clone()),
            status: Some(ticket.status),
            ..TicketPatch::default()
        };
        engine::update_ticket(&mut conn, &config, ticket.clone(), patch, &actor).unwrap();

        let after: i64 = ticket_activities::table
            .filter(ticket_activities::ticket_id.eq(ticket.id))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn staff_public_comment_moves_open_ticket_to_in_progress() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let customer = insert_user(&mut conn, UserRole::Customer);
        let agent = insert_user(&mut conn, UserRole::Agent);
        let ticket = make_ticket(&mut conn, &config, &customer);
        assert_eq!(ticket.status, TicketStatus::Open);

        engine::add_comment(
            &mut conn,
            &config,
            ticket.clone(),
            "Looking into this now".into(),
            CommentType::Comment,
            false,
            &agent,
        )
        .unwrap();

        let reloaded: Ticket = deskserver::shared::schema::tickets::table
            .filter(deskserver::shared::schema::tickets::id.eq(ticket.id))
            .first(&mut conn)
            .unwrap();
        assert_eq!(reloaded.status, TicketStatus::InProgress);

        let status_activities: i64 = ticket_activities::table
            .filter(ticket_activities::ticket_id.eq(ticket.id))
            .filter(ticket_activities::action.eq("status_changed"))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(status_activities, 1);
    }

    #[test]
    fn internal_note_does_not_transition_the_ticket() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let customer = insert_user(&mut conn, UserRole::Customer);
        let agent = insert_user(&mut conn, UserRole::Agent);
        let ticket = make_ticket(&mut conn, &config, &customer);

        engine::add_comment(
            &mut conn,
            &config,
            ticket.clone(),
            "Needs escalation".into(),
            CommentType::InternalNote,
            true,
            &agent,
        )
        .unwrap();

        let reloaded: Ticket = deskserver::shared::schema::tickets::table
            .filter(deskserver::shared::schema::tickets::id.eq(ticket.id))
            .first(&mut conn)
            .unwrap();
        assert_eq!(reloaded.status, TicketStatus::Open);
    }

    #[test]
    fn delete_ticket_removes_dependents() {
        let Some(mut conn) = test_conn() else { return };
        let config = config();
        let actor = insert_user(&mut conn, UserRole::Customer);
        let ticket = make_ticket(&mut conn, &config, &actor);

        engine::vote(&mut conn, ticket.id, actor.id, VoteType::Up).unwrap();
        engine::delete_ticket(&mut conn, ticket.id).unwrap();

        let remaining: i64 = ticket_activities::table
            .filter(ticket_activities::ticket_id.eq(ticket.id))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(remaining, 0);

        assert!(matches!(
            engine::delete_ticket(&mut conn, ticket.id),
            Err(deskserver::shared::error::ApiError::NotFound(_))
        ));
    }
}
