//! Tickets: conversation containers.

mod model;
mod repository;

pub use model::{Channel, Ticket, TicketId, TicketStatus};
pub use repository::TicketRepository;
