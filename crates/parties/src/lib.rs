//! Parties domain module (customers and suppliers, event-sourced).
//!
//! This crate contains business rules for parties (customers and suppliers),
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod party;

pub use party::{
    ContactInfo, DeleteParty, Party, PartyCommand, PartyDeleted, PartyEvent, PartyId, PartyKind,
    PartyRegistered, PartyUpdated, RegisterParty, UpdateDetails,
};
