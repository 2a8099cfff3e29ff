use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{require_text, Aggregate, AggregateRoot, DomainError};
use stockbook_events::Event;

stockbook_core::typed_id!(
    /// Party identifier (customer or supplier).
    PartyId
);

/// Party kind: customer or supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

impl PartyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyKind::Customer => "customer",
            PartyKind::Supplier => "supplier",
        }
    }
}

/// Contact information for a party.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl ContactInfo {
    /// Trim every field and drop the blank ones.
    fn cleaned(&self) -> Result<ContactInfo, DomainError> {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let email = clean(&self.email);
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(DomainError::field("email", "must be a valid email address"));
            }
        }
        Ok(ContactInfo {
            email,
            phone: clean(&self.phone),
            address: clean(&self.address),
        })
    }
}

/// Aggregate root: Party (customer or supplier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    id: PartyId,
    kind: PartyKind,
    name: String,
    contact: ContactInfo,
    tax_id: Option<String>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Party {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PartyId) -> Self {
        Self {
            id,
            kind: PartyKind::Customer,
            name: String::new(),
            contact: ContactInfo::default(),
            tax_id: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn tax_id(&self) -> Option<&str> {
        self.tax_id.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParty {
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: Option<ContactInfo>,
    pub tax_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub party_id: PartyId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new contact info (if None, keep existing).
    pub contact: Option<ContactInfo>,
    /// Optional new tax identifier (if None, keep existing).
    pub tax_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteParty {
    pub party_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyCommand {
    RegisterParty(RegisterParty),
    UpdateDetails(UpdateDetails),
    DeleteParty(DeleteParty),
}

/// Event: PartyRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRegistered {
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub tax_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartyUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyUpdated {
    pub party_id: PartyId,
    pub name: String,
    pub contact: ContactInfo,
    pub tax_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartyDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyDeleted {
    pub party_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyEvent {
    PartyRegistered(PartyRegistered),
    PartyUpdated(PartyUpdated),
    PartyDeleted(PartyDeleted),
}

impl Event for PartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartyEvent::PartyRegistered(_) => "parties.party.registered",
            PartyEvent::PartyUpdated(_) => "parties.party.updated",
            PartyEvent::PartyDeleted(_) => "parties.party.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartyEvent::PartyRegistered(e) => e.occurred_at,
            PartyEvent::PartyUpdated(e) => e.occurred_at,
            PartyEvent::PartyDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Party {
    type Command = PartyCommand;
    type Event = PartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartyEvent::PartyRegistered(e) => {
                self.id = e.party_id;
                self.kind = e.kind;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.tax_id = e.tax_id.clone();
                self.created = true;
            }
            PartyEvent::PartyUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.tax_id = e.tax_id.clone();
            }
            PartyEvent::PartyDeleted(_) => {
                self.deleted = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartyCommand::RegisterParty(cmd) => self.handle_register(cmd),
            PartyCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            PartyCommand::DeleteParty(cmd) => self.handle_delete(cmd),
        }
    }
}

fn clean_tax_id(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
}

impl Party {
    fn ensure_live(&self, party_id: PartyId) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        if self.id != party_id {
            return Err(DomainError::invariant("party_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterParty) -> Result<Vec<PartyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("party already exists"));
        }
        require_text("name", &cmd.name)?;

        let contact = cmd.contact.clone().unwrap_or_default().cleaned()?;

        Ok(vec![PartyEvent::PartyRegistered(PartyRegistered {
            party_id: cmd.party_id,
            kind: cmd.kind,
            name: cmd.name.trim().to_string(),
            contact,
            tax_id: clean_tax_id(&cmd.tax_id),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_live(cmd.party_id)?;

        let new_name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        require_text("name", &new_name)?;

        let new_contact = match &cmd.contact {
            Some(contact) => contact.cleaned()?,
            None => self.contact.clone(),
        };
        let new_tax_id = match &cmd.tax_id {
            Some(_) => clean_tax_id(&cmd.tax_id),
            None => self.tax_id.clone(),
        };

        Ok(vec![PartyEvent::PartyUpdated(PartyUpdated {
            party_id: cmd.party_id,
            name: new_name.trim().to_string(),
            contact: new_contact,
            tax_id: new_tax_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteParty) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_live(cmd.party_id)?;

        // "Still referenced by a movement" is checked by the service against read models.
        Ok(vec![PartyEvent::PartyDeleted(PartyDeleted {
            party_id: cmd.party_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(kind: PartyKind) -> Party {
        let party_id = PartyId::generate();
        let mut party = Party::empty(party_id);
        let events = party
            .handle(&PartyCommand::RegisterParty(RegisterParty {
                party_id,
                kind,
                name: "Atlas Distribution".to_string(),
                contact: Some(ContactInfo {
                    email: Some("orders@atlas.example".to_string()),
                    phone: Some(" ".to_string()),
                    address: None,
                }),
                tax_id: Some(" ice0001 ".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap();
        events.iter().for_each(|e| party.apply(e));
        party
    }

    #[test]
    fn register_party_cleans_contact_and_tax_id() {
        let party = registered(PartyKind::Supplier);

        assert_eq!(party.kind(), PartyKind::Supplier);
        assert_eq!(party.contact().phone, None);
        assert_eq!(party.tax_id(), Some("ICE0001"));
        assert_eq!(party.version(), 1);
    }

    #[test]
    fn register_party_rejects_empty_name() {
        let party_id = PartyId::generate();
        let err = Party::empty(party_id)
            .handle(&PartyCommand::RegisterParty(RegisterParty {
                party_id,
                kind: PartyKind::Customer,
                name: "   ".to_string(),
                contact: None,
                tax_id: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::field("name", "is required"));
    }

    #[test]
    fn register_party_rejects_malformed_email() {
        let party_id = PartyId::generate();
        let err = Party::empty(party_id)
            .handle(&PartyCommand::RegisterParty(RegisterParty {
                party_id,
                kind: PartyKind::Customer,
                name: "Corner shop".to_string(),
                contact: Some(ContactInfo {
                    email: Some("corner-shop".to_string()),
                    ..ContactInfo::default()
                }),
                tax_id: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidField { ref field, .. } if field == "email"));
    }

    #[test]
    fn update_keeps_fields_that_are_not_given() {
        let mut party = registered(PartyKind::Customer);
        let party_id = *party.id();

        let events = party
            .handle(&PartyCommand::UpdateDetails(UpdateDetails {
                party_id,
                name: Some("Atlas Wholesale".to_string()),
                contact: None,
                tax_id: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        events.iter().for_each(|e| party.apply(e));

        assert_eq!(party.name(), "Atlas Wholesale");
        assert_eq!(party.contact().email.as_deref(), Some("orders@atlas.example"));
        assert_eq!(party.tax_id(), Some("ICE0001"));
    }

    #[test]
    fn deleted_party_is_gone() {
        let mut party = registered(PartyKind::Customer);
        let party_id = *party.id();
        let delete = PartyCommand::DeleteParty(DeleteParty {
            party_id,
            occurred_at: test_time(),
        });

        let events = party.handle(&delete).unwrap();
        events.iter().for_each(|e| party.apply(e));

        assert!(party.is_deleted());
        assert_eq!(party.handle(&delete).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn update_with_wrong_id_is_an_invariant_violation() {
        let party = registered(PartyKind::Customer);
        let err = party
            .handle(&PartyCommand::UpdateDetails(UpdateDetails {
                party_id: PartyId::generate(),
                name: None,
                contact: None,
                tax_id: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: Apply is deterministic (same events = same final state).
            #[test]
            fn apply_is_deterministic(name in "[A-Za-z][A-Za-z0-9 ]{0,60}") {
                let party_id = PartyId::generate();
                let at = Utc::now();
                let events = vec![
                    PartyEvent::PartyRegistered(PartyRegistered {
                        party_id,
                        kind: PartyKind::Supplier,
                        name: name.clone(),
                        contact: ContactInfo::default(),
                        tax_id: None,
                        occurred_at: at,
                    }),
                    PartyEvent::PartyUpdated(PartyUpdated {
                        party_id,
                        name: format!("{name} SARL"),
                        contact: ContactInfo::default(),
                        tax_id: Some("X1".to_string()),
                        occurred_at: at,
                    }),
                ];

                let mut a = Party::empty(party_id);
                let mut b = Party::empty(party_id);
                events.iter().for_each(|e| a.apply(e));
                events.iter().for_each(|e| b.apply(e));

                prop_assert_eq!(&a, &b);
                prop_assert_eq!(a.version(), 2);
            }
        }
    }
}
