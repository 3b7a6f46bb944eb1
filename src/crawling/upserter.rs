//! Horse upserter
//!
//! Merges freshly scraped fields into the record matched by studbook id, or
//! creates it. Absent fields never clear stored values.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::crawling::pedigree_reconciler::ReconciledPedigree;
use crate::domain::horse::{Horse, HorseFields, HorseUpdate, LivingStatus, NewHorse, StudbookInfo};
use crate::domain::repositories::HorseRepository;
use crate::domain::services::HorseInfo;
use crate::domain::value_objects::{StudbookId, parse_studbook_date};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Horse),
    Updated(Horse),
}

impl UpsertOutcome {
    #[must_use]
    pub const fn horse(&self) -> &Horse {
        match self {
            Self::Created(horse) | Self::Updated(horse) => horse,
        }
    }

    #[must_use]
    pub const fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Field set written for one scraped page
#[must_use]
pub fn fields_from_info(info: &HorseInfo, pedigree: &ReconciledPedigree) -> HorseFields {
    let deceased_date = info.deceased.as_deref().and_then(parse_studbook_date);
    HorseFields {
        name: Some(info.name.clone()),
        sex: info.sex,
        color: info.color.clone(),
        date_of_birth: info.date_of_birth.as_deref().and_then(parse_studbook_date),
        status: deceased_date.map(|_| LivingStatus::Deceased),
        deceased_date,
        life_number: info.life_number.clone(),
        microchip_number: info.microchip_number.clone(),
        dna_typed: info.dna_typed.clone(),
        aust_id: info.aust_id.clone(),
        bred_by: info.bred_by.clone(),
        family: info.family.clone(),
        foal_ref: info.foal_ref.clone(),
        taproot: pedigree.taproot.clone(),
        pedigree_info: Some(pedigree.triples.clone()),
    }
}

pub struct HorseUpserter {
    horses: Arc<dyn HorseRepository>,
}

impl HorseUpserter {
    pub fn new(horses: Arc<dyn HorseRepository>) -> Self {
        Self { horses }
    }

    /// Update the record with `studbook_id`, or create it with
    /// `first_scraped == last_scraped == scraped_at`
    pub async fn upsert(
        &self,
        studbook_id: StudbookId,
        fields: HorseFields,
        scraped_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        if let Some(existing) = self.horses.find_by_studbook_id(studbook_id).await? {
            return self.update_existing(existing, fields, scraped_at).await;
        }

        let new_horse = NewHorse {
            name: fields.name.clone().unwrap_or_default(),
            studbook: StudbookInfo {
                id: studbook_id,
                first_scraped: Some(scraped_at),
                last_scraped: Some(scraped_at),
            },
            fields: fields.clone(),
        };

        match self.horses.create(new_horse).await {
            Ok(horse) => {
                info!(studbook_id, id = %horse.id, name = %horse.name, "Created horse");
                Ok(UpsertOutcome::Created(horse))
            }
            Err(create_error) => {
                // A concurrent stub insert may have won the race for this id
                let existing = self
                    .horses
                    .find_by_studbook_id(studbook_id)
                    .await?
                    .ok_or(create_error)
                    .with_context(|| format!("Failed to create horse {studbook_id}"))?;
                debug!(studbook_id, "Create lost a race, updating existing record");
                self.update_existing(existing, fields, scraped_at).await
            }
        }
    }

    async fn update_existing(
        &self,
        existing: Horse,
        fields: HorseFields,
        scraped_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        let update = HorseUpdate {
            fields,
            scraped_at: Some(scraped_at),
        };
        let studbook_id = existing.studbook.id;
        let horse = self
            .horses
            .update(existing.id, &update)
            .await?
            .ok_or_else(|| anyhow!("Horse {studbook_id} disappeared before update"))?;
        info!(studbook_id, id = %horse.id, name = %horse.name, "Updated horse");
        Ok(UpsertOutcome::Updated(horse))
    }
}
