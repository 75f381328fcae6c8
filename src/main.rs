use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{FixedOffset, NaiveDate};
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod access;
mod completion;
mod config;
mod db;
mod error;
mod models;
mod reminders;
mod report;
mod schedule;

use access::{Capability, Operator, Role};
use error::DeskError;
use models::{
    parse_alert_days, ContractEdit, ContractStatus, Frequency, MaintenanceContract, NewContract,
    Urgency, DEFAULT_ALERT_DAYS,
};

#[derive(Parser)]
#[command(name = "maintenance-desk")]
#[command(about = "Periodic maintenance contracts, due dates and reminders", long_about = None)]
struct Cli {
    /// Role the operator acts under
    #[arg(long, global = true, value_enum, default_value_t = Role::Viewer)]
    role: Role,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo clients and contracts
    Seed,
    /// Import contracts from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List contracts with their urgency
    List {
        #[arg(long)]
        client: Option<String>,
        #[arg(long, value_enum)]
        status: Option<ContractStatus>,
        #[arg(long)]
        json: bool,
    },
    /// Create a contract
    Add {
        #[arg(long)]
        client_email: String,
        /// Creates the client when no client has this email yet
        #[arg(long)]
        client_name: Option<String>,
        #[arg(long)]
        client_phone: Option<String>,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, value_enum)]
        frequency: Frequency,
        /// First due date; defaults to one period from today
        #[arg(long)]
        next_date: Option<String>,
        #[arg(long)]
        planned_next: Option<String>,
        /// Comma separated reminder offsets in days
        #[arg(long)]
        alert_days: Option<String>,
        #[arg(long)]
        no_email: bool,
        #[arg(long)]
        whatsapp: bool,
    },
    /// Edit contract fields
    #[command(group(
        ArgGroup::new("planned")
            .args(["planned_next", "clear_planned"])
            .multiple(false)
    ))]
    Edit {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_enum)]
        frequency: Option<Frequency>,
        #[arg(long)]
        next_date: Option<String>,
        #[arg(long)]
        planned_next: Option<String>,
        #[arg(long)]
        clear_planned: bool,
        #[arg(long, value_enum)]
        status: Option<ContractStatus>,
        #[arg(long)]
        alert_days: Option<String>,
        #[arg(long)]
        email_alert: Option<bool>,
        #[arg(long)]
        whatsapp_alert: Option<bool>,
    },
    /// Mark the current maintenance cycle as done
    Complete {
        #[arg(long)]
        id: Uuid,
        /// Completion date; defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Remove a contract
    Delete {
        #[arg(long)]
        id: Uuid,
    },
    /// Show completion history for a contract
    History {
        #[arg(long)]
        id: Uuid,
    },
    /// Show reminders due today with hand-off links
    Alerts {
        /// Log issued reminders so they are not repeated today
        #[arg(long)]
        record: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        client: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct ListedContract<'a> {
    #[serde(flatten)]
    contract: &'a MaintenanceContract,
    urgency: Urgency,
    forecast_next_date: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = config::Settings::from_env()?;
    config::init_tracing(settings.log_json);

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let operator = Operator::new(settings.operator_name.clone(), cli.role);
    let offset = settings.utc_offset;

    match run(cli.command, &pool, &operator, offset).await {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<DeskError>() {
            Some(desk) if desk.is_user_correctable() => {
                tracing::info!(error = %desk, "command rejected");
                eprintln!("{desk}");
                std::process::exit(2);
            }
            _ => Err(err),
        },
    }
}

async fn run(
    command: Commands,
    pool: &PgPool,
    operator: &Operator,
    offset: FixedOffset,
) -> anyhow::Result<()> {
    let today = schedule::today_at(offset);

    match command {
        Commands::InitDb => {
            operator.require(Capability::ManageSchema)?;
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            operator.require(Capability::ImportData)?;
            let inserted = db::seed(pool, today).await?;
            println!("Seed data inserted ({inserted} new contracts).");
        }
        Commands::Import { csv } => {
            operator.require(Capability::ImportData)?;
            let inserted = db::import_csv(pool, &csv, today, offset).await?;
            tracing::info!(inserted, path = %csv.display(), "csv import finished");
            println!("Inserted {inserted} contracts from {}.", csv.display());
        }
        Commands::List {
            client,
            status,
            json,
        } => {
            operator.require(Capability::ViewContracts)?;
            let filter = db::ContractFilter {
                client_email: client,
                status,
            };
            let contracts =
                db::with_read_retry("fetch_contracts", || db::fetch_contracts(pool, &filter))
                    .await?;
            print_contracts(&contracts, today, offset, json)?;
        }
        Commands::Add {
            client_email,
            client_name,
            client_phone,
            title,
            description,
            frequency,
            next_date,
            planned_next,
            alert_days,
            no_email,
            whatsapp,
        } => {
            operator.require(Capability::EditContracts)?;
            let client_id = match client_name {
                Some(name) => {
                    db::upsert_client(pool, &name, &client_email, client_phone.as_deref()).await?
                }
                None => db::find_client_by_email(pool, &client_email)
                    .await?
                    .ok_or_else(|| {
                        DeskError::validation(format!(
                            "no client with email {client_email}; pass --client-name to create one"
                        ))
                    })?,
            };

            let next_maintenance_date = match next_date {
                Some(raw) => schedule::parse_calendar_date(&raw, offset)?,
                None => schedule::advance_at(today, frequency, offset)?,
            };
            let contract = NewContract {
                client_id,
                title,
                description,
                frequency,
                next_maintenance_date,
                planned_next_date: parse_optional_date(planned_next.as_deref(), offset)?,
                alert_days_before: match alert_days {
                    Some(raw) => parse_alert_days(&raw)?,
                    None => DEFAULT_ALERT_DAYS.to_vec(),
                },
                send_email_alert: !no_email,
                send_whatsapp_alert: whatsapp,
            };

            let id = db::insert_contract(pool, &contract, None)
                .await?
                .context("contract was not inserted")?;
            tracing::info!(%id, operator = %operator.name, "contract created");
            println!("Created contract {id}, first visit due {next_maintenance_date}.");
        }
        Commands::Edit {
            id,
            title,
            description,
            frequency,
            next_date,
            planned_next,
            clear_planned,
            status,
            alert_days,
            email_alert,
            whatsapp_alert,
        } => {
            operator.require(Capability::EditContracts)?;
            let planned_next_date = if clear_planned {
                Some(None)
            } else {
                parse_optional_date(planned_next.as_deref(), offset)?.map(Some)
            };
            let edit = ContractEdit {
                title,
                description,
                frequency,
                next_maintenance_date: parse_optional_date(next_date.as_deref(), offset)?,
                planned_next_date,
                status,
                alert_days_before: alert_days.as_deref().map(parse_alert_days).transpose()?,
                send_email_alert: email_alert,
                send_whatsapp_alert: whatsapp_alert,
            };
            if edit.is_empty() {
                return Err(DeskError::validation("nothing to change").into());
            }

            let current =
                db::with_read_retry("fetch_contract", || db::fetch_contract(pool, id)).await?;
            let updated = edit.apply(&current)?;
            db::update_contract(pool, &updated).await?;
            tracing::info!(%id, operator = %operator.name, "contract updated");
            println!(
                "Updated {}; next visit {}.",
                updated.title, updated.next_maintenance_date
            );
        }
        Commands::Complete { id, date, note } => {
            operator.require(Capability::CompleteMaintenance)?;
            let contract =
                db::with_read_retry("fetch_contract", || db::fetch_contract(pool, id)).await?;
            let request = completion::CompletionRequest {
                completed_on: parse_optional_date(date.as_deref(), offset)?,
                note,
                completed_by: operator.name.clone(),
            };

            let done = completion::complete(&contract, &request, today, offset)?;
            db::record_completion(pool, &done, contract.updated_at, offset).await?;
            tracing::info!(
                %id,
                operator = %operator.name,
                completed = %done.history.completed_date,
                next = %done.history.next_date_assigned,
                "maintenance completed"
            );
            println!(
                "Completed {} on {}. Next visit {}.",
                done.contract.title,
                done.history.completed_date,
                done.contract.next_maintenance_date
            );
        }
        Commands::Delete { id } => {
            operator.require(Capability::DeleteContracts)?;
            db::delete_contract(pool, id).await?;
            tracing::info!(%id, operator = %operator.name, "contract deleted");
            println!("Deleted contract {id}.");
        }
        Commands::History { id } => {
            operator.require(Capability::ViewContracts)?;
            let entries =
                db::with_read_retry("fetch_history", || db::fetch_history(pool, id)).await?;
            if entries.is_empty() {
                println!("No completions recorded.");
            }
            for entry in entries {
                println!(
                    "- {} by {} (next {}){}",
                    entry.completed_date,
                    entry.completed_by,
                    entry.next_date_assigned,
                    if entry.note.is_empty() {
                        String::new()
                    } else {
                        format!(": {}", entry.note)
                    }
                );
            }
        }
        Commands::Alerts { record } => {
            operator.require(Capability::SendReminders)?;
            let filter = db::ContractFilter {
                client_email: None,
                status: Some(ContractStatus::Active),
            };
            let contracts =
                db::with_read_retry("fetch_contracts", || db::fetch_contracts(pool, &filter))
                    .await?;
            send_alerts(pool, operator, &contracts, today, record).await?;
        }
        Commands::Report {
            client,
            since_days,
            out,
        } => {
            operator.require(Capability::ViewContracts)?;
            let since = schedule::window_start(today, since_days)?;
            let filter = db::ContractFilter {
                client_email: client.clone(),
                status: None,
            };
            let contracts =
                db::with_read_retry("fetch_contracts", || db::fetch_contracts(pool, &filter))
                    .await?;
            let mut visits =
                db::with_read_retry("fetch_recent_history", || {
                    db::fetch_recent_history(pool, since)
                })
                .await?;
            if client.is_some() {
                let ids: Vec<Uuid> = contracts.iter().map(|contract| contract.id).collect();
                visits.retain(|visit| ids.contains(&visit.entry.contract_id));
            }

            let report = report::build_report(client.as_deref(), today, since, &contracts, &visits);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn parse_optional_date(
    raw: Option<&str>,
    offset: FixedOffset,
) -> error::Result<Option<NaiveDate>> {
    raw.map(|value| schedule::parse_calendar_date(value, offset))
        .transpose()
}

fn print_contracts(
    contracts: &[MaintenanceContract],
    today: NaiveDate,
    offset: FixedOffset,
    json: bool,
) -> anyhow::Result<()> {
    let listed: Vec<ListedContract<'_>> = contracts
        .iter()
        .map(|contract| ListedContract {
            contract,
            urgency: schedule::classify(contract.next_maintenance_date, today),
            forecast_next_date: completion::forecast_next(contract, offset).ok(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    if listed.is_empty() {
        println!("No contracts found.");
        return Ok(());
    }

    for item in &listed {
        println!(
            "- [{}] {} for {} due {} ({} days, {}) id {}",
            item.urgency.status.as_str(),
            item.contract.title,
            item.contract.client_name,
            item.contract.next_maintenance_date,
            item.urgency.days_until,
            item.contract.status.as_str(),
            item.contract.id
        );
    }
    Ok(())
}

async fn send_alerts(
    pool: &PgPool,
    operator: &Operator,
    contracts: &[MaintenanceContract],
    today: NaiveDate,
    record: bool,
) -> anyhow::Result<()> {
    let by_id: HashMap<Uuid, &MaintenanceContract> =
        contracts.iter().map(|contract| (contract.id, contract)).collect();
    let due = reminders::due_reminders(contracts, today);

    if due.is_empty() {
        println!("No reminders due today.");
        return Ok(());
    }

    for reminder in due {
        let Some(contract) = by_id.get(&reminder.contract_id) else {
            continue;
        };
        let already_sent = db::with_read_retry("reminder_already_sent", || {
            db::reminder_already_sent(pool, reminder.contract_id, reminder.channel, today)
        })
        .await?;
        if already_sent {
            println!(
                "- {} via {}: already sent today",
                contract.title,
                reminder.channel.as_str()
            );
            continue;
        }

        match &reminder.link {
            Some(link) => println!(
                "- {} via {} ({} days): {}",
                contract.title,
                reminder.channel.as_str(),
                reminder.days_until,
                link
            ),
            None => {
                println!(
                    "- {} via {}: no contact details on file",
                    contract.title,
                    reminder.channel.as_str()
                );
                continue;
            }
        }

        if record
            && db::record_reminder(
                pool,
                reminder.contract_id,
                reminder.channel,
                today,
                &operator.name,
            )
            .await?
        {
            tracing::info!(
                contract = %reminder.contract_id,
                channel = reminder.channel.as_str(),
                "reminder logged"
            );
        }
    }

    Ok(())
}
