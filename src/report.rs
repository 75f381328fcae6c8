use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{CompletedVisit, ContractStatus, MaintenanceContract, Urgency, UrgencyStatus};
use crate::schedule;

#[derive(Debug, Clone)]
pub struct ScheduledContract<'a> {
    pub contract: &'a MaintenanceContract,
    pub urgency: Urgency,
}

/// Active contracts with their urgency, most pressing first.
pub fn rank_contracts(contracts: &[MaintenanceContract], today: NaiveDate) -> Vec<ScheduledContract<'_>> {
    let mut ranked: Vec<ScheduledContract<'_>> = contracts
        .iter()
        .filter(|contract| contract.status == ContractStatus::Active)
        .map(|contract| ScheduledContract {
            contract,
            urgency: schedule::classify(contract.next_maintenance_date, today),
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.urgency
            .days_until
            .cmp(&b.urgency.days_until)
            .then_with(|| a.contract.title.cmp(&b.contract.title))
    });
    ranked
}

pub fn urgency_mix(ranked: &[ScheduledContract<'_>]) -> Vec<(UrgencyStatus, usize)> {
    let mut counts: HashMap<UrgencyStatus, usize> = HashMap::new();
    for item in ranked {
        *counts.entry(item.urgency.status).or_insert(0) += 1;
    }

    UrgencyStatus::ALL
        .into_iter()
        .map(|status| (status, counts.get(&status).copied().unwrap_or(0)))
        .collect()
}

fn describe_days(days: i64) -> String {
    match days {
        d if d < -1 => format!("{} days overdue", -d),
        -1 => "1 day overdue".to_string(),
        0 => "due today".to_string(),
        1 => "due tomorrow".to_string(),
        d => format!("due in {d} days"),
    }
}

pub fn build_report(
    client: Option<&str>,
    today: NaiveDate,
    since: NaiveDate,
    contracts: &[MaintenanceContract],
    visits: &[CompletedVisit],
) -> String {
    let ranked = rank_contracts(contracts, today);
    let mut output = String::new();
    let client_label = client.unwrap_or("all clients");

    let _ = writeln!(output, "# Maintenance Schedule Report");
    let _ = writeln!(output, "Generated for {} on {}", client_label, today);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Urgency Mix");

    if ranked.is_empty() {
        let _ = writeln!(output, "No active contracts.");
    } else {
        for (status, count) in urgency_mix(&ranked) {
            let _ = writeln!(output, "- {}: {}", status.as_str(), count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overdue");
    let overdue: Vec<_> = ranked
        .iter()
        .filter(|item| item.urgency.status == UrgencyStatus::Overdue)
        .collect();

    if overdue.is_empty() {
        let _ = writeln!(output, "Nothing overdue.");
    } else {
        for item in overdue {
            let _ = writeln!(
                output,
                "- {} for {} ({}), was due {}",
                item.contract.title,
                item.contract.client_name,
                describe_days(item.urgency.days_until),
                item.contract.next_maintenance_date
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Next 30 Days");
    let upcoming: Vec<_> = ranked
        .iter()
        .filter(|item| {
            matches!(
                item.urgency.status,
                UrgencyStatus::Urgent | UrgencyStatus::Upcoming
            )
        })
        .collect();

    if upcoming.is_empty() {
        let _ = writeln!(output, "No visits due in the next 30 days.");
    } else {
        for item in upcoming {
            let _ = writeln!(
                output,
                "- {} {} for {} ({}, {})",
                item.contract.next_maintenance_date,
                item.contract.title,
                item.contract.client_name,
                item.contract.frequency.as_str(),
                describe_days(item.urgency.days_until)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Completions");
    let _ = writeln!(output, "Since {}:", since);

    if visits.is_empty() {
        let _ = writeln!(output, "No completions recorded for this window.");
    } else {
        for visit in visits.iter().take(10) {
            let _ = write!(
                output,
                "- {} {} for {} by {}, next on {}",
                visit.entry.completed_date,
                visit.contract_title,
                visit.client_name,
                visit.entry.completed_by,
                visit.entry.next_date_assigned
            );
            if visit.entry.note.is_empty() {
                let _ = writeln!(output);
            } else {
                let _ = writeln!(output, ": {}", visit.entry.note);
            }
        }
    }

    output
}
