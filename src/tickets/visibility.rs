//! Role-based ticket visibility.
//!
//! One predicate, applied uniformly to detail fetch, list and search:
//! customers see only their own non-internal tickets; agents see
//! non-internal tickets plus anything they created or are assigned;
//! admins see everything.

use diesel::pg::Pg;
use diesel::prelude::*;
use uuid::Uuid;

use crate::shared::enums::UserRole;
use crate::shared::models::{Ticket, TicketComment};
use crate::shared::schema::tickets;

/// In-memory form of the predicate, for single-ticket checks.
pub fn can_view(role: UserRole, user_id: Uuid, ticket: &Ticket) -> bool {
    match role {
        UserRole::Admin => true,
        UserRole::Customer => ticket.created_by == user_id && !ticket.is_internal,
        UserRole::Agent => {
            !ticket.is_internal
                || ticket.created_by == user_id
                || ticket.assigned_to == Some(user_id)
        }
    }
}

/// Query form of the same predicate, for list and search.
pub fn scope(role: UserRole, user_id: Uuid) -> tickets::BoxedQuery<'static, Pg> {
    let query = tickets::table.into_boxed();
    match role {
        UserRole::Admin => query,
        UserRole::Customer => query
            .filter(tickets::created_by.eq(user_id))
            .filter(tickets::is_internal.eq(false)),
        UserRole::Agent => query.filter(
            tickets::is_internal
                .eq(false)
                .or(tickets::created_by.eq(user_id))
                .or(tickets::assigned_to.eq(user_id)),
        ),
    }
}

/// Customers never see internal comments, regardless of ticket
/// visibility.
pub fn can_view_comment(role: UserRole, comment: &TicketComment) -> bool {
    match role {
        UserRole::Agent | UserRole::Admin => true,
        UserRole::Customer => !comment.is_internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::enums::{CommentType, TicketStatus};
    use chrono::Utc;

    fn ticket(owner: Uuid, assignee: Option<Uuid>, internal: bool) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            ticket_number: "TICK-001".into(),
            subject: "s".into(),
            description: "d".into(),
            status: TicketStatus::Open,
            created_by: owner,
            assigned_to: assignee,
            category_id: Uuid::new_v4(),
            priority_id: Uuid::new_v4(),
            upvotes: 0,
            downvotes: 0,
            is_internal: internal,
            tags: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            resolved_at: None,
            closed_at: None,
        }
    }

    #[test]
    fn customers_see_only_their_own_public_tickets() {
        let me = Uuid::new_v4();
        assert!(can_view(UserRole::Customer, me, &ticket(me, None, false)));
        assert!(!can_view(UserRole::Customer, me, &ticket(me, None, true)));
        assert!(!can_view(
            UserRole::Customer,
            me,
            &ticket(Uuid::new_v4(), None, false)
        ));
    }

    #[test]
    fn agents_see_public_plus_their_own_and_assigned() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(can_view(UserRole::Agent, me, &ticket(other, None, false)));
        assert!(!can_view(UserRole::Agent, me, &ticket(other, None, true)));
        assert!(can_view(UserRole::Agent, me, &ticket(me, None, true)));
        assert!(can_view(UserRole::Agent, me, &ticket(other, Some(me), true)));
    }

    #[test]
    fn admins_see_everything() {
        let me = Uuid::new_v4();
        assert!(can_view(UserRole::Admin, me, &ticket(Uuid::new_v4(), None, true)));
    }

    #[test]
    fn internal_comments_hidden_from_customers() {
        let comment = TicketComment {
            id: Uuid::new_v4(),
            ticket_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            comment_type: CommentType::InternalNote,
            content: "note".into(),
            is_internal: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!can_view_comment(UserRole::Customer, &comment));
        assert!(can_view_comment(UserRole::Agent, &comment));
        assert!(can_view_comment(UserRole::Admin, &comment));
    }
}
