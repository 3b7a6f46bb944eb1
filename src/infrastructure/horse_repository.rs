//! SQLite record store for horses
//!
//! Studbook id is the unique key. Stub creation is a single
//! `INSERT .. ON CONFLICT DO NOTHING` so concurrent workers reconciling the
//! same ancestor converge on one row.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::horse::{Horse, HorseUpdate, LivingStatus, NewHorse, PedigreeEntry, Sex, StudbookInfo, TaprootRef};
use crate::domain::repositories::HorseRepository;
use crate::domain::value_objects::{HorseId, StudbookId};

const HORSE_COLUMNS: &str = "id, studbook_id, name, first_scraped, last_scraped, sex, color, date_of_birth, status, \
     deceased_date, life_number, microchip_number, dna_typed, aust_id, bred_by, family, foal_ref, \
     taproot_name, taproot_studbook_id, taproot_id, pedigree_info, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteHorseRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteHorseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn find_by_id(&self, id: HorseId) -> Result<Option<Horse>> {
        let row = sqlx::query(&format!("SELECT {HORSE_COLUMNS} FROM horses WHERE id = ?"))
            .bind(id.value())
            .fetch_optional(&*self.pool)
            .await?;
        row.as_ref().map(horse_from_row).transpose()
    }
}

fn studbook_id_from(value: i64) -> Result<StudbookId> {
    StudbookId::try_from(value).map_err(|_| anyhow!("studbook id out of range: {value}"))
}

fn horse_from_row(row: &SqliteRow) -> Result<Horse> {
    let pedigree_json: String = row.try_get("pedigree_info")?;
    let pedigree_info: Vec<PedigreeEntry> =
        serde_json::from_str(&pedigree_json).context("Corrupt pedigree_info column")?;

    let taproot = match (
        row.try_get::<Option<String>, _>("taproot_name")?,
        row.try_get::<Option<i64>, _>("taproot_studbook_id")?,
        row.try_get::<Option<i64>, _>("taproot_id")?,
    ) {
        (Some(name), Some(studbook_id), Some(id)) => Some(TaprootRef {
            name,
            studbook_id: studbook_id_from(studbook_id)?,
            id: HorseId(id),
        }),
        _ => None,
    };

    Ok(Horse {
        id: HorseId(row.try_get("id")?),
        name: row.try_get("name")?,
        studbook: StudbookInfo {
            id: studbook_id_from(row.try_get("studbook_id")?)?,
            first_scraped: row.try_get("first_scraped")?,
            last_scraped: row.try_get("last_scraped")?,
        },
        sex: row.try_get::<Option<String>, _>("sex")?.as_deref().and_then(Sex::parse),
        color: row.try_get("color")?,
        date_of_birth: row.try_get("date_of_birth")?,
        status: row
            .try_get::<Option<String>, _>("status")?
            .as_deref()
            .and_then(LivingStatus::parse),
        deceased_date: row.try_get("deceased_date")?,
        life_number: row.try_get("life_number")?,
        microchip_number: row.try_get("microchip_number")?,
        dna_typed: row.try_get("dna_typed")?,
        aust_id: row.try_get("aust_id")?,
        bred_by: row.try_get("bred_by")?,
        family: row.try_get("family")?,
        foal_ref: row.try_get("foal_ref")?,
        taproot,
        pedigree_info,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl HorseRepository for SqliteHorseRepository {
    async fn find_by_studbook_id(&self, studbook_id: StudbookId) -> Result<Option<Horse>> {
        let row = sqlx::query(&format!("SELECT {HORSE_COLUMNS} FROM horses WHERE studbook_id = ?"))
            .bind(i64::from(studbook_id))
            .fetch_optional(&*self.pool)
            .await?;
        row.as_ref().map(horse_from_row).transpose()
    }

    async fn create(&self, horse: NewHorse) -> Result<Horse> {
        let now = Utc::now();
        let studbook_id = horse.studbook.id;
        let fields = &horse.fields;
        let pedigree_json = serde_json::to_string(fields.pedigree_info.as_deref().unwrap_or_default())?;
        let name = fields.name.clone().unwrap_or_else(|| horse.name.clone());

        let result = sqlx::query(
            r"
            INSERT INTO horses
            (studbook_id, name, first_scraped, last_scraped, sex, color, date_of_birth, status,
             deceased_date, life_number, microchip_number, dna_typed, aust_id, bred_by, family, foal_ref,
             taproot_name, taproot_studbook_id, taproot_id, pedigree_info, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(i64::from(studbook_id))
        .bind(&name)
        .bind(horse.studbook.first_scraped)
        .bind(horse.studbook.last_scraped)
        .bind(fields.sex.map(Sex::as_str))
        .bind(&fields.color)
        .bind(fields.date_of_birth)
        .bind(fields.status.map(LivingStatus::as_str))
        .bind(fields.deceased_date)
        .bind(&fields.life_number)
        .bind(&fields.microchip_number)
        .bind(&fields.dna_typed)
        .bind(&fields.aust_id)
        .bind(&fields.bred_by)
        .bind(&fields.family)
        .bind(&fields.foal_ref)
        .bind(fields.taproot.as_ref().map(|t| t.name.clone()))
        .bind(fields.taproot.as_ref().map(|t| i64::from(t.studbook_id)))
        .bind(fields.taproot.as_ref().map(|t| t.id.value()))
        .bind(pedigree_json)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await
        .with_context(|| format!("Failed to create horse with studbook id {studbook_id}"))?;

        let id = HorseId(result.last_insert_rowid());
        self.find_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Created horse {id} not found on read-back"))
    }

    async fn insert_stub_if_absent(&self, studbook_id: StudbookId, name: &str) -> Result<(Horse, bool)> {
        let now: DateTime<Utc> = Utc::now();
        let result = sqlx::query(
            r"
            INSERT INTO horses (studbook_id, name, pedigree_info, created_at, updated_at)
            VALUES (?, ?, '[]', ?, ?)
            ON CONFLICT(studbook_id) DO NOTHING
            ",
        )
        .bind(i64::from(studbook_id))
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        let created = result.rows_affected() == 1;
        let horse = self
            .find_by_studbook_id(studbook_id)
            .await?
            .ok_or_else(|| anyhow!("Horse with studbook id {studbook_id} vanished after insert"))?;
        Ok((horse, created))
    }

    async fn update(&self, id: HorseId, update: &HorseUpdate) -> Result<Option<Horse>> {
        let fields = &update.fields;
        let pedigree_json = fields
            .pedigree_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r"
            UPDATE horses SET
                name = COALESCE(?, name),
                sex = COALESCE(?, sex),
                color = COALESCE(?, color),
                date_of_birth = COALESCE(?, date_of_birth),
                status = COALESCE(?, status),
                deceased_date = COALESCE(?, deceased_date),
                life_number = COALESCE(?, life_number),
                microchip_number = COALESCE(?, microchip_number),
                dna_typed = COALESCE(?, dna_typed),
                aust_id = COALESCE(?, aust_id),
                bred_by = COALESCE(?, bred_by),
                family = COALESCE(?, family),
                foal_ref = COALESCE(?, foal_ref),
                taproot_name = COALESCE(?, taproot_name),
                taproot_studbook_id = COALESCE(?, taproot_studbook_id),
                taproot_id = COALESCE(?, taproot_id),
                pedigree_info = COALESCE(?, pedigree_info),
                first_scraped = COALESCE(first_scraped, ?),
                last_scraped = COALESCE(?, last_scraped),
                updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(&fields.name)
        .bind(fields.sex.map(Sex::as_str))
        .bind(&fields.color)
        .bind(fields.date_of_birth)
        .bind(fields.status.map(LivingStatus::as_str))
        .bind(fields.deceased_date)
        .bind(&fields.life_number)
        .bind(&fields.microchip_number)
        .bind(&fields.dna_typed)
        .bind(&fields.aust_id)
        .bind(&fields.bred_by)
        .bind(&fields.family)
        .bind(&fields.foal_ref)
        .bind(fields.taproot.as_ref().map(|t| t.name.clone()))
        .bind(fields.taproot.as_ref().map(|t| i64::from(t.studbook_id)))
        .bind(fields.taproot.as_ref().map(|t| t.id.value()))
        .bind(pedigree_json)
        .bind(update.scraped_at)
        .bind(update.scraped_at)
        .bind(Utc::now())
        .bind(id.value())
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM horses")
            .fetch_one(&*self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(u64::try_from(total).unwrap_or_default())
    }
}
