//! Horse record entity
//!
//! A horse is keyed by its studbook id. Records are either fully scraped
//! detail pages or bare stubs created while reconciling someone else's
//! pedigree (name + studbook id only).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{HorseId, StudbookId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "MALE",
            Self::Female => "FEMALE",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "MALE" => Some(Self::Male),
            "FEMALE" => Some(Self::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LivingStatus {
    Alive,
    Deceased,
}

impl LivingStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alive => "ALIVE",
            Self::Deceased => "DECEASED",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ALIVE" => Some(Self::Alive),
            "DECEASED" => Some(Self::Deceased),
            _ => None,
        }
    }
}

/// Registry bookkeeping for a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudbookInfo {
    pub id: StudbookId,
    pub first_scraped: Option<DateTime<Utc>>,
    pub last_scraped: Option<DateTime<Utc>>,
}

/// Denormalized `{name, internal id}` snapshot of another record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorseRef {
    pub name: String,
    pub id: HorseId,
}

/// One `{horse, father, mother}` grouping of a pedigree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PedigreeEntry {
    pub horse: HorseRef,
    pub father: HorseRef,
    pub mother: HorseRef,
}

/// Taproot ancestor reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaprootRef {
    pub name: String,
    pub studbook_id: StudbookId,
    pub id: HorseId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Horse {
    pub id: HorseId,
    pub name: String,
    pub studbook: StudbookInfo,
    pub sex: Option<Sex>,
    pub color: Option<String>,
    pub date_of_birth: Option<DateTime<Utc>>,
    pub status: Option<LivingStatus>,
    pub deceased_date: Option<DateTime<Utc>>,
    pub life_number: Option<String>,
    pub microchip_number: Option<String>,
    pub dna_typed: Option<String>,
    pub aust_id: Option<String>,
    pub bred_by: Option<String>,
    pub family: Option<String>,
    pub foal_ref: Option<String>,
    pub taproot: Option<TaprootRef>,
    pub pedigree_info: Vec<PedigreeEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Horse {
    #[must_use]
    pub fn to_ref(&self) -> HorseRef {
        HorseRef {
            name: self.name.clone(),
            id: self.id,
        }
    }

    /// A stub has never been scraped as a detail page
    #[must_use]
    pub const fn is_stub(&self) -> bool {
        self.studbook.first_scraped.is_none()
    }
}

/// Scalar fields of a horse; `None` means "leave untouched" on update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorseFields {
    pub name: Option<String>,
    pub sex: Option<Sex>,
    pub color: Option<String>,
    pub date_of_birth: Option<DateTime<Utc>>,
    pub status: Option<LivingStatus>,
    pub deceased_date: Option<DateTime<Utc>>,
    pub life_number: Option<String>,
    pub microchip_number: Option<String>,
    pub dna_typed: Option<String>,
    pub aust_id: Option<String>,
    pub bred_by: Option<String>,
    pub family: Option<String>,
    pub foal_ref: Option<String>,
    pub taproot: Option<TaprootRef>,
    pub pedigree_info: Option<Vec<PedigreeEntry>>,
}

impl HorseFields {
    /// Overlay the present fields onto an existing record
    pub fn apply_to(&self, horse: &mut Horse) {
        fn set<T: Clone>(target: &mut T, value: Option<&T>) {
            if let Some(value) = value {
                target.clone_from(value);
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: Option<&T>) {
            if let Some(value) = value {
                *target = Some(value.clone());
            }
        }

        set(&mut horse.name, self.name.as_ref());
        set_opt(&mut horse.sex, self.sex.as_ref());
        set_opt(&mut horse.color, self.color.as_ref());
        set_opt(&mut horse.date_of_birth, self.date_of_birth.as_ref());
        set_opt(&mut horse.status, self.status.as_ref());
        set_opt(&mut horse.deceased_date, self.deceased_date.as_ref());
        set_opt(&mut horse.life_number, self.life_number.as_ref());
        set_opt(&mut horse.microchip_number, self.microchip_number.as_ref());
        set_opt(&mut horse.dna_typed, self.dna_typed.as_ref());
        set_opt(&mut horse.aust_id, self.aust_id.as_ref());
        set_opt(&mut horse.bred_by, self.bred_by.as_ref());
        set_opt(&mut horse.family, self.family.as_ref());
        set_opt(&mut horse.foal_ref, self.foal_ref.as_ref());
        set_opt(&mut horse.taproot, self.taproot.as_ref());
        set(&mut horse.pedigree_info, self.pedigree_info.as_ref());
    }
}

/// Record to be created by the store; the store assigns the internal id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHorse {
    pub name: String,
    pub studbook: StudbookInfo,
    pub fields: HorseFields,
}

impl NewHorse {
    /// Bare pedigree stub: name + studbook id, never scraped
    #[must_use]
    pub fn stub(studbook_id: StudbookId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            studbook: StudbookInfo {
                id: studbook_id,
                first_scraped: None,
                last_scraped: None,
            },
            fields: HorseFields::default(),
        }
    }

    /// Materialize with a store-assigned id
    #[must_use]
    pub fn into_horse(self, id: HorseId, now: DateTime<Utc>) -> Horse {
        let mut horse = Horse {
            id,
            name: self.name,
            studbook: self.studbook,
            sex: None,
            color: None,
            date_of_birth: None,
            status: None,
            deceased_date: None,
            life_number: None,
            microchip_number: None,
            dna_typed: None,
            aust_id: None,
            bred_by: None,
            family: None,
            foal_ref: None,
            taproot: None,
            pedigree_info: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.fields.apply_to(&mut horse);
        horse
    }
}

/// Partial update addressed by internal id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HorseUpdate {
    pub fields: HorseFields,
    /// Marks a successful scrape: sets `last_scraped`, and `first_scraped` only if unset
    pub scraped_at: Option<DateTime<Utc>>,
}

impl HorseUpdate {
    pub fn apply_to(&self, horse: &mut Horse, now: DateTime<Utc>) {
        self.fields.apply_to(horse);
        if let Some(scraped_at) = self.scraped_at {
            horse.studbook.first_scraped.get_or_insert(scraped_at);
            horse.studbook.last_scraped = Some(scraped_at);
        }
        horse.updated_at = now;
    }
}
