//! Operator subcommands.
//!
//! Every command talks to `parking-ledger-server` through a
//! `SyncController<HttpLedgerClient>`: load the snapshot, apply the change
//! locally, commit it, print the committed record.
//!
//! ## Commands
//!
//! - `parking list [--zone Z] [--occupied|--free] [--json]`
//! - `parking show <ID> [--json]`
//! - `parking occupy <ID> --plate P [--name N] [--phone T]`
//! - `parking release <ID>`
//! - `parking edit <ID> [--name N] [--plate P] [--phone T]`
//! - `parking pay <ID> --year Y --month M --note TEXT`
//! - `parking zones`

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use parking_core::{
    InfoUpdate, Month, ParkingConfig, SpotId, SpotRecord, SpotStatus, SyncController, registry,
};
use parking_ledger_service::HttpLedgerClient;

#[derive(Debug, Parser)]
#[command(name = "parking", version, about = "Parking spot occupancy and payment ledger")]
pub struct ParkingCli {
    /// Ledger service base URL, overrides `client.base_url`.
    #[arg(long = "server", global = true)]
    pub server: Option<String>,

    /// Config file (defaults to $PARKING_LEDGER_CONFIG or ~/.config/parking-ledger/config.toml).
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: SpotSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum SpotSubcommand {
    /// List spots with their occupancy.
    List(ListArgs),
    /// Show one spot, payments included.
    Show(ShowArgs),
    /// Assign a tenant to a spot.
    Occupy(OccupyArgs),
    /// Free a spot. Payment history is kept.
    Release(IdArgs),
    /// Edit tenant details. Clearing the plate frees the spot.
    Edit(EditArgs),
    /// Record a monthly payment note.
    Pay(PayArgs),
    /// List zones of the floor plan.
    Zones,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only this zone (e.g. A, M).
    #[arg(long = "zone", short = 'z')]
    pub zone: Option<String>,

    /// Only occupied spots.
    #[arg(long = "occupied", conflicts_with = "free")]
    pub occupied: bool,

    /// Only free spots.
    #[arg(long = "free")]
    pub free: bool,

    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Spot identifier (e.g. A-05).
    pub id: String,

    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    /// Spot identifier (e.g. A-05).
    pub id: String,
}

#[derive(Debug, Args)]
pub struct OccupyArgs {
    /// Spot identifier (e.g. A-05).
    pub id: String,

    /// Licence plate; stored upper-cased.
    #[arg(long = "plate", short = 'p')]
    pub plate: String,

    /// Tenant name.
    #[arg(long = "name", short = 'n', default_value = "")]
    pub name: String,

    /// Contact phone.
    #[arg(long = "phone", short = 't', default_value = "")]
    pub phone: String,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Spot identifier (e.g. A-05).
    pub id: String,

    #[arg(long = "name", short = 'n')]
    pub name: Option<String>,

    /// New plate; an empty value frees the spot.
    #[arg(long = "plate", short = 'p')]
    pub plate: Option<String>,

    #[arg(long = "phone", short = 't')]
    pub phone: Option<String>,
}

#[derive(Debug, Args)]
pub struct PayArgs {
    /// Spot identifier (e.g. A-05).
    pub id: String,

    /// Four-digit year.
    #[arg(long = "year", short = 'y')]
    pub year: String,

    /// Month name (Enero..Diciembre, any case).
    #[arg(long = "month", short = 'm')]
    pub month: String,

    /// Free-text note, e.g. the amount paid.
    #[arg(long = "note")]
    pub note: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

impl ParkingCli {
    pub async fn run(&self) -> Result<(), String> {
        if let SpotSubcommand::Zones = self.command {
            print!("{}", format_zones());
            return Ok(());
        }

        let controller = self.controller()?;
        controller.load().await.map_err(|e| e.to_string())?;

        match &self.command {
            SpotSubcommand::List(args) => cmd_list(&controller, args).await,
            SpotSubcommand::Show(args) => cmd_show(&controller, args).await,
            SpotSubcommand::Occupy(args) => {
                let record = controller
                    .occupy(&SpotId::new(args.id.as_str()), &args.name, &args.plate, &args.phone)
                    .await
                    .map_err(|e| e.to_string())?;
                println!("{}", format_record_line(&record));
                Ok(())
            }
            SpotSubcommand::Release(args) => {
                let record = controller
                    .release(&SpotId::new(args.id.as_str()))
                    .await
                    .map_err(|e| e.to_string())?;
                println!("{}", format_record_line(&record));
                Ok(())
            }
            SpotSubcommand::Edit(args) => {
                let update = InfoUpdate {
                    tenant_name: args.name.clone(),
                    plate: args.plate.clone(),
                    phone: args.phone.clone(),
                };
                let record = controller
                    .update_info(&SpotId::new(args.id.as_str()), &update)
                    .await
                    .map_err(|e| e.to_string())?;
                println!("{}", format_record_line(&record));
                Ok(())
            }
            SpotSubcommand::Pay(args) => {
                let record = controller
                    .record_payment(
                        &SpotId::new(args.id.as_str()),
                        &args.year,
                        &args.month,
                        &args.note,
                    )
                    .await
                    .map_err(|e| e.to_string())?;
                print!("{}", format_record_detail(&record));
                Ok(())
            }
            SpotSubcommand::Zones => Ok(()),
        }
    }

    fn controller(&self) -> Result<SyncController<HttpLedgerClient>, String> {
        let mut config = match &self.config {
            Some(path) => ParkingConfig::load_from_path(path),
            None => ParkingConfig::load(),
        }
        .map_err(|e| e.to_string())?;

        if let Some(server) = &self.server {
            config.client.base_url = server.clone();
        }
        tracing::debug!(server = %config.client.base_url, "using ledger service");

        let client = HttpLedgerClient::from_config(&config.client).map_err(|e| e.to_string())?;
        Ok(SyncController::from_config(Arc::new(client), &config))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read commands
// ─────────────────────────────────────────────────────────────────────────────

async fn cmd_list(
    controller: &SyncController<HttpLedgerClient>,
    args: &ListArgs,
) -> Result<(), String> {
    if let Some(zone) = &args.zone
        && !registry::zones().iter().any(|z| z.code.eq_ignore_ascii_case(zone))
    {
        return Err(format!("unknown zone: {zone}"));
    }

    let stored = controller.snapshot().await;
    let filter = StatusFilter::from_flags(args.occupied, args.free);
    let records = floor_view(stored, args.zone.as_deref(), filter);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).unwrap_or_else(|_| "[]".to_string())
        );
    } else if records.is_empty() {
        println!("No spots match.");
    } else {
        for record in &records {
            println!("{}", format_record_line(record));
        }
        let occupied = records.iter().filter(|r| r.is_occupied()).count();
        println!("{occupied}/{} occupied", records.len());
    }
    Ok(())
}

async fn cmd_show(
    controller: &SyncController<HttpLedgerClient>,
    args: &ShowArgs,
) -> Result<(), String> {
    let record = controller.get(&SpotId::new(args.id.as_str())).await;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print!("{}", format_record_detail(&record));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Any,
    Occupied,
    Free,
}

impl StatusFilter {
    pub fn from_flags(occupied: bool, free: bool) -> Self {
        match (occupied, free) {
            (true, _) => Self::Occupied,
            (false, true) => Self::Free,
            (false, false) => Self::Any,
        }
    }

    fn accepts(self, record: &SpotRecord) -> bool {
        match self {
            Self::Any => true,
            Self::Occupied => record.status == SpotStatus::Occupied,
            Self::Free => record.status == SpotStatus::Free,
        }
    }
}

/// Every registered spot in floor order, unseen ones as FREE, followed by
/// stored spots outside the floor plan.
pub fn floor_view(
    stored: Vec<SpotRecord>,
    zone: Option<&str>,
    filter: StatusFilter,
) -> Vec<SpotRecord> {
    let mut by_id: std::collections::HashMap<SpotId, SpotRecord> =
        stored.into_iter().map(|r| (r.id.clone(), r)).collect();

    let mut view = Vec::new();
    for z in registry::zones() {
        if zone.is_some_and(|code| !z.code.eq_ignore_ascii_case(code)) {
            continue;
        }
        for id in z.spot_ids() {
            let record = by_id
                .remove(&id)
                .unwrap_or_else(|| SpotRecord::free(id.clone()));
            view.push(record);
        }
    }

    if zone.is_none() {
        let extra: BTreeSet<SpotId> = by_id.keys().cloned().collect();
        for id in extra {
            if let Some(record) = by_id.remove(&id) {
                view.push(record);
            }
        }
    }

    view.retain(|r| filter.accepts(r));
    view
}

pub fn format_record_line(record: &SpotRecord) -> String {
    if !record.is_occupied() {
        return format!("{:<5} {}", record.id, record.status);
    }
    let mut line = format!(
        "{:<5} {:<8} {:<9} {}",
        record.id,
        record.status,
        record.plate_str(),
        record.tenant_name.as_deref().unwrap_or_default()
    );
    if let Some(phone) = record.phone.as_deref().filter(|p| !p.is_empty()) {
        line.push_str(&format!("  tel {phone}"));
    }
    if let Some(since) = record.occupied_since_at() {
        line.push_str(&format!("  since {}", since.format("%Y-%m-%d %H:%M")));
    }
    line
}

pub fn format_record_detail(record: &SpotRecord) -> String {
    let mut out = String::new();
    let category = registry::zone_of(record.id.as_str())
        .map(|z| format!("{:?}", z.category).to_lowercase())
        .unwrap_or_else(|| "unregistered".to_string());
    out.push_str(&format!("Spot:     {} ({category})\n", record.id));
    out.push_str(&format!("Status:   {}\n", record.status));
    if record.is_occupied() {
        out.push_str(&format!(
            "Tenant:   {}\n",
            record.tenant_name.as_deref().unwrap_or_default()
        ));
        out.push_str(&format!("Plate:    {}\n", record.plate_str()));
        out.push_str(&format!(
            "Phone:    {}\n",
            record.phone.as_deref().unwrap_or_default()
        ));
        if let Some(since) = record.occupied_since_at() {
            out.push_str(&format!("Since:    {}\n", since.format("%Y-%m-%d %H:%M UTC")));
        }
    }

    if record.payments.is_empty() {
        out.push_str("Payments: none\n");
    } else {
        out.push_str("Payments:\n");
        for (year, months) in record.payments.iter().rev() {
            // Canonical months in calendar order, then anything else as stored.
            let mut cells: Vec<String> = Month::ALL
                .iter()
                .filter_map(|m| months.get(m.name()).map(|note| format!("{m}={note}")))
                .collect();
            cells.extend(
                months
                    .iter()
                    .filter(|(name, _)| Month::parse(name).is_none())
                    .map(|(name, note)| format!("{name}={note}")),
            );
            out.push_str(&format!("  {year}: {}\n", cells.join(", ")));
        }
    }
    out
}

pub fn format_zones() -> String {
    let mut out = String::new();
    for zone in registry::zones() {
        let category = format!("{:?}", zone.category).to_lowercase();
        out.push_str(&format!(
            "{}  {:<10} {:>2} spots ({}-01..{}-{:02})\n",
            zone.code, category, zone.spots, zone.code, zone.code, zone.spots
        ));
    }
    let total: usize = registry::zones().iter().map(|z| usize::from(z.spots)).sum();
    out.push_str(&format!("{total} spots\n"));
    out
}
