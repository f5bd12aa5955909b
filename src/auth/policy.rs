//! Capability-based authorization.
//!
//! One `(role, action)` table consulted per operation, instead of role
//! conditionals scattered across handlers. Ownership-scoped refinements
//! (a customer acting on somebody else's ticket) live in the helpers
//! below so every endpoint applies the same rule.

use crate::shared::enums::{TicketStatus, UserRole};
use crate::shared::models::Ticket;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateTicket,
    EditTicket,
    DeleteTicket,
    AssignTicket,
    ChangeStatus,
    VoteTicket,
    CommentTicket,
    ManageTaxonomy,
    ManageUsers,
    ViewAdminStats,
}

pub fn role_allows(role: UserRole, action: Action) -> bool {
    use Action::*;
    use UserRole::*;
    match (role, action) {
        (_, CreateTicket | EditTicket | DeleteTicket | ChangeStatus | VoteTicket | CommentTicket) => {
            true
        }
        (Agent | Admin, AssignTicket) => true,
        (Customer, AssignTicket) => false,
        (Admin, ManageTaxonomy | ManageUsers | ViewAdminStats) => true,
        (Customer | Agent, ManageTaxonomy | ManageUsers | ViewAdminStats) => false,
    }
}

/// Customers may only edit or delete tickets they created.
pub fn can_modify_ticket(role: UserRole, user_id: Uuid, ticket: &Ticket) -> bool {
    match role {
        UserRole::Agent | UserRole::Admin => true,
        UserRole::Customer => ticket.created_by == user_id,
    }
}

/// Customers may only move their own tickets into `closed` or back to
/// `open`; agents and admins may set any status on any visible ticket.
pub fn can_transition(
    role: UserRole,
    user_id: Uuid,
    ticket: &Ticket,
    target: TicketStatus,
) -> Result<(), TransitionDenied> {
    match role {
        UserRole::Agent | UserRole::Admin => Ok(()),
        UserRole::Customer => {
            if ticket.created_by != user_id {
                return Err(TransitionDenied::NotOwner);
            }
            if !matches!(target, TicketStatus::Closed | TicketStatus::Open) {
                return Err(TransitionDenied::StatusNotPermitted);
            }
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDenied {
    NotOwner,
    StatusNotPermitted,
}
