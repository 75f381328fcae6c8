use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use uuid::Uuid;

use crate::completion::Completion;
use crate::error::{DeskError, Result};
use crate::models::{
    normalize_alert_days, parse_alert_days, AlertChannel, CompletedVisit, ContractStatus,
    Frequency, HistoryEntry, MaintenanceContract, NewContract, DEFAULT_ALERT_DAYS,
};
use crate::schedule;

const READ_ATTEMPTS: u32 = 3;

const CONTRACT_COLUMNS: &str = "c.id, c.client_id, cl.full_name, cl.email, cl.phone, \
     c.title, c.description, c.frequency, c.last_maintenance_date, \
     c.next_maintenance_date, c.planned_next_date, c.status, c.alert_days_before, \
     c.send_email_alert, c.send_whatsapp_alert, c.updated_at \
     FROM maintenance_desk.contracts c \
     JOIN maintenance_desk.clients cl ON cl.id = c.client_id";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Retries a read-only operation on transient storage failures.
/// Writes never go through here, so a completion is never replayed.
pub async fn with_read_retry<T, F, Fut>(operation: &str, mut run: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match run().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < READ_ATTEMPTS => {
                tracing::warn!(operation, attempt, error = %err, "read failed, retrying");
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn contract_from_row(row: &PgRow) -> Result<MaintenanceContract> {
    let frequency: String = row.try_get("frequency")?;
    let status: String = row.try_get("status")?;

    Ok(MaintenanceContract {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        client_name: row.try_get("full_name")?,
        client_email: row.try_get("email")?,
        client_phone: row.try_get("phone")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        frequency: Frequency::parse(&frequency)
            .ok_or_else(|| DeskError::validation(format!("unknown frequency `{frequency}`")))?,
        last_maintenance_date: row.try_get("last_maintenance_date")?,
        next_maintenance_date: row.try_get("next_maintenance_date")?,
        planned_next_date: row.try_get("planned_next_date")?,
        status: ContractStatus::parse(&status)
            .ok_or_else(|| DeskError::validation(format!("unknown status `{status}`")))?,
        alert_days_before: row.try_get("alert_days_before")?,
        send_email_alert: row.try_get("send_email_alert")?,
        send_whatsapp_alert: row.try_get("send_whatsapp_alert")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn history_from_row(row: &PgRow) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.try_get("id")?,
        contract_id: row.try_get("contract_id")?,
        completed_date: row.try_get("completed_date")?,
        next_date_assigned: row.try_get("next_date_assigned")?,
        note: row.try_get("note")?,
        completed_by: row.try_get("completed_by")?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ContractFilter {
    pub client_email: Option<String>,
    pub status: Option<ContractStatus>,
}

pub async fn fetch_contracts(
    pool: &PgPool,
    filter: &ContractFilter,
) -> Result<Vec<MaintenanceContract>> {
    let mut query = format!("SELECT {CONTRACT_COLUMNS} WHERE c.deleted_at IS NULL");
    let mut param = 0;

    if filter.client_email.is_some() {
        param += 1;
        query.push_str(&format!(" AND cl.email = ${param}"));
    }
    if filter.status.is_some() {
        param += 1;
        query.push_str(&format!(" AND c.status = ${param}"));
    }
    query.push_str(" ORDER BY c.next_maintenance_date, c.title");

    let mut rows = sqlx::query(&query);
    if let Some(email) = &filter.client_email {
        rows = rows.bind(email);
    }
    if let Some(status) = filter.status {
        rows = rows.bind(status.as_str());
    }

    let records = rows.fetch_all(pool).await?;
    records.iter().map(contract_from_row).collect()
}

pub async fn fetch_contract(pool: &PgPool, id: Uuid) -> Result<MaintenanceContract> {
    let query = format!("SELECT {CONTRACT_COLUMNS} WHERE c.id = $1 AND c.deleted_at IS NULL");
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DeskError::NotFound { id })?;
    contract_from_row(&row)
}

pub async fn find_client_by_email(pool: &PgPool, email: &str) -> Result<Option<Uuid>> {
    let row = sqlx::query("SELECT id FROM maintenance_desk.clients WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(match row {
        Some(row) => Some(row.try_get("id")?),
        None => None,
    })
}

pub async fn upsert_client(
    executor: impl PgExecutor<'_>,
    name: &str,
    email: &str,
    phone: Option<&str>,
) -> Result<Uuid> {
    if name.trim().is_empty() || email.trim().is_empty() {
        return Err(DeskError::validation("client name and email are required"));
    }

    let row = sqlx::query(
        r#"
        INSERT INTO maintenance_desk.clients (id, full_name, email, phone)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            phone = COALESCE(EXCLUDED.phone, maintenance_desk.clients.phone)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name.trim())
    .bind(email.trim())
    .bind(phone.map(str::trim).filter(|phone| !phone.is_empty()))
    .fetch_one(executor)
    .await?;
    Ok(row.try_get("id")?)
}

pub async fn insert_contract(
    executor: impl PgExecutor<'_>,
    contract: &NewContract,
    source_key: Option<&str>,
) -> Result<Option<Uuid>> {
    contract.validate()?;
    let id = Uuid::new_v4();

    let result = sqlx::query(
        r#"
        INSERT INTO maintenance_desk.contracts
        (id, client_id, title, description, frequency, next_maintenance_date,
         planned_next_date, alert_days_before, send_email_alert, send_whatsapp_alert,
         source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(contract.client_id)
    .bind(contract.title.trim())
    .bind(&contract.description)
    .bind(contract.frequency.as_str())
    .bind(contract.next_maintenance_date)
    .bind(contract.planned_next_date)
    .bind(normalize_alert_days(&contract.alert_days_before)?)
    .bind(contract.send_email_alert)
    .bind(contract.send_whatsapp_alert)
    .bind(source_key)
    .execute(executor)
    .await?;

    Ok((result.rows_affected() > 0).then_some(id))
}

/// Plain field update. Concurrent edits resolve as last write wins.
pub async fn update_contract(pool: &PgPool, contract: &MaintenanceContract) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE maintenance_desk.contracts
        SET title = $2, description = $3, frequency = $4, next_maintenance_date = $5,
            planned_next_date = $6, status = $7, alert_days_before = $8,
            send_email_alert = $9, send_whatsapp_alert = $10,
            updated_at = clock_timestamp()
        WHERE id = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(contract.id)
    .bind(&contract.title)
    .bind(&contract.description)
    .bind(contract.frequency.as_str())
    .bind(contract.next_maintenance_date)
    .bind(contract.planned_next_date)
    .bind(contract.status.as_str())
    .bind(&contract.alert_days_before)
    .bind(contract.send_email_alert)
    .bind(contract.send_whatsapp_alert)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DeskError::NotFound { id: contract.id });
    }
    Ok(())
}

const SOFT_DELETE_CONTRACT: &str = "UPDATE maintenance_desk.contracts SET deleted_at = now() \
     WHERE id = $1 AND deleted_at IS NULL";

/// Soft delete; history rows stay in place.
pub async fn delete_contract(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query(SOFT_DELETE_CONTRACT)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DeskError::NotFound { id });
    }
    Ok(())
}

/// Writes a completion atomically. The contract row is only updated if it
/// still carries `expected_version`; otherwise nothing is written.
pub async fn record_completion(
    pool: &PgPool,
    completion: &Completion,
    expected_version: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<()> {
    let contract = &completion.contract;
    let entry = &completion.history;
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE maintenance_desk.contracts
        SET last_maintenance_date = $2, next_maintenance_date = $3,
            planned_next_date = NULL, updated_at = clock_timestamp()
        WHERE id = $1 AND updated_at = $4 AND deleted_at IS NULL
        "#,
    )
    .bind(contract.id)
    .bind(contract.last_maintenance_date)
    .bind(contract.next_maintenance_date)
    .bind(expected_version)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        let exists = sqlx::query(
            "SELECT 1 FROM maintenance_desk.contracts WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(contract.id)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();
        tx.rollback().await?;
        return Err(if exists {
            DeskError::Conflict { id: contract.id }
        } else {
            DeskError::NotFound { id: contract.id }
        });
    }

    sqlx::query(
        r#"
        INSERT INTO maintenance_desk.contract_history
        (id, contract_id, completed_date, next_date_assigned, note, completed_by, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id)
    .bind(entry.contract_id)
    .bind(entry.completed_date)
    .bind(entry.next_date_assigned)
    .bind(&entry.note)
    .bind(&entry.completed_by)
    .bind(schedule::to_storage_timestamp(entry.completed_date, offset))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn fetch_history(pool: &PgPool, contract_id: Uuid) -> Result<Vec<HistoryEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, contract_id, completed_date, next_date_assigned, note, completed_by
        FROM maintenance_desk.contract_history
        WHERE contract_id = $1
        ORDER BY completed_date DESC, recorded_at DESC
        "#,
    )
    .bind(contract_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(history_from_row).collect()
}

pub async fn fetch_recent_history(pool: &PgPool, since: NaiveDate) -> Result<Vec<CompletedVisit>> {
    let rows = sqlx::query(
        r#"
        SELECT h.id, h.contract_id, h.completed_date, h.next_date_assigned, h.note,
               h.completed_by, c.title, cl.full_name
        FROM maintenance_desk.contract_history h
        JOIN maintenance_desk.contracts c ON c.id = h.contract_id
        JOIN maintenance_desk.clients cl ON cl.id = c.client_id
        WHERE h.completed_date >= $1
        ORDER BY h.completed_date DESC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<CompletedVisit> {
            Ok(CompletedVisit {
                entry: history_from_row(row)?,
                contract_title: row.try_get("title")?,
                client_name: row.try_get("full_name")?,
            })
        })
        .collect()
}

pub async fn reminder_already_sent(
    pool: &PgPool,
    contract_id: Uuid,
    channel: AlertChannel,
    day: NaiveDate,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT 1 FROM maintenance_desk.reminder_log \
         WHERE contract_id = $1 AND channel = $2 AND sent_on = $3",
    )
    .bind(contract_id)
    .bind(channel.as_str())
    .bind(day)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Returns false when the reminder was already logged for that day.
pub async fn record_reminder(
    pool: &PgPool,
    contract_id: Uuid,
    channel: AlertChannel,
    day: NaiveDate,
    sent_by: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO maintenance_desk.reminder_log (contract_id, channel, sent_on, sent_by)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (contract_id, channel, sent_on) DO NOTHING
        "#,
    )
    .bind(contract_id)
    .bind(channel.as_str())
    .bind(day)
    .bind(sent_by)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Demo data spread across every urgency bucket relative to `today`.
pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<usize> {
    let clients = vec![
        (
            "Harbor Clinic",
            "facilities@harborclinic.example",
            Some("+55 11 98888-1234"),
        ),
        ("Northwind Bakery", "owner@northwindbakery.example", None),
        (
            "Lakeside Hotel",
            "maintenance@lakesidehotel.example",
            Some("+1 555 010 2030"),
        ),
    ];

    let mut client_ids = Vec::new();
    for (name, email, phone) in clients {
        client_ids.push(upsert_client(pool, name, email, phone).await?);
    }

    let contracts = vec![
        ("seed-001", 0, "Chiller inspection", Frequency::Quarterly, -3, true, true),
        ("seed-002", 0, "Generator load test", Frequency::Semiannual, 7, true, false),
        ("seed-003", 1, "Oven burner service", Frequency::Monthly, 15, true, false),
        ("seed-004", 2, "Boiler safety check", Frequency::Annual, 30, true, true),
        ("seed-005", 2, "Elevator inspection", Frequency::Bimonthly, 90, false, true),
    ];

    let mut inserted = 0;
    for (source_key, client, title, frequency, offset_days, email, whatsapp) in contracts {
        let contract = NewContract {
            client_id: client_ids[client],
            title: title.to_string(),
            description: format!("{} visit", frequency.as_str()),
            frequency,
            next_maintenance_date: today + ChronoDuration::days(offset_days),
            planned_next_date: None,
            alert_days_before: DEFAULT_ALERT_DAYS.to_vec(),
            send_email_alert: email,
            send_whatsapp_alert: whatsapp,
        };
        if insert_contract(pool, &contract, Some(source_key)).await?.is_some() {
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[derive(Debug, serde::Deserialize)]
pub struct ImportRow {
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub frequency: Frequency,
    pub next_maintenance_date: Option<String>,
    pub alert_days_before: Option<String>,
    pub source_key: Option<String>,
}

/// Fields resolved from one CSV row, minus the client id which needs storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImport {
    pub next_maintenance_date: NaiveDate,
    pub alert_days_before: Vec<i32>,
}

/// A missing due date starts the first cycle one period from `today`.
pub fn prepare_import(
    row: &ImportRow,
    today: NaiveDate,
    offset: FixedOffset,
) -> Result<PreparedImport> {
    if row.client_name.trim().is_empty() || row.client_email.trim().is_empty() {
        return Err(DeskError::validation("client name and email are required"));
    }
    if row.title.trim().is_empty() {
        return Err(DeskError::validation("title is required"));
    }

    let next_maintenance_date = match row.next_maintenance_date.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => schedule::parse_calendar_date(raw, offset)?,
        _ => schedule::advance_at(today, row.frequency, offset)?,
    };
    let alert_days_before = match row.alert_days_before.as_deref() {
        Some(raw) => parse_alert_days(raw)?,
        None => DEFAULT_ALERT_DAYS.to_vec(),
    };

    Ok(PreparedImport {
        next_maintenance_date,
        alert_days_before,
    })
}

/// Validates every row before anything is written. The first bad row fails
/// the whole batch, named by its line in the file (the header is line 1).
pub fn prepare_all(
    rows: &[ImportRow],
    today: NaiveDate,
    offset: FixedOffset,
) -> Result<Vec<PreparedImport>> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            prepare_import(row, today, offset).map_err(|err| match err {
                DeskError::Validation(msg) => {
                    DeskError::validation(format!("row {}: {msg}", index + 2))
                }
                other => other,
            })
        })
        .collect()
}

/// All rows land in one transaction, or none do.
pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    today: NaiveDate,
    offset: FixedOffset,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<ImportRow>().enumerate() {
        rows.push(result.with_context(|| format!("row {} is malformed", index + 2))?);
    }
    let prepared = prepare_all(&rows, today, offset)?;

    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for (index, (row, prepared)) in rows.iter().zip(prepared).enumerate() {
        let line = index + 2;
        let client_id = upsert_client(
            &mut *tx,
            &row.client_name,
            &row.client_email,
            row.client_phone.as_deref(),
        )
        .await?;

        let source_key = row
            .source_key
            .clone()
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let contract = NewContract {
            client_id,
            title: row.title.clone(),
            description: row.description.clone(),
            frequency: row.frequency,
            next_maintenance_date: prepared.next_maintenance_date,
            planned_next_date: None,
            alert_days_before: prepared.alert_days_before,
            send_email_alert: true,
            send_whatsapp_alert: row.client_phone.is_some(),
        };

        match insert_contract(&mut *tx, &contract, Some(&source_key)).await? {
            Some(id) => {
                tracing::debug!(%id, line, "imported contract");
                inserted += 1;
            }
            None => tracing::debug!(source_key = %source_key, line, "contract already imported"),
        }
    }

    tx.commit().await?;
    Ok(inserted)
}
