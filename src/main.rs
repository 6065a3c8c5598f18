use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod backend;
mod columns;
mod config;
mod dashboard;
mod debounce;
mod facets;
mod filter;
mod gate;
mod login;
mod models;
mod names;
mod report;
mod report_form;
mod session;
mod sort;

use backend::{Backend, PgBackend};
use columns::Column;
use config::Config;
use dashboard::Dashboard;
use filter::DatePreset;
use gate::{GateDecision, RouteMatch};
use login::LoginForm;
use models::{IncidentRecord, LookupRecord, LookupTable};
use report_form::{IdLookup, LookupState, ReportDraft, ReportForm};
use session::{AuthState, SessionStore};
use sort::SortSpec;

/// Upper bound on waiting for a session notification or an id lookup.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "incident-desk")]
#[command(about = "Medical device incident reporting desk", long_about = None)]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,
    /// Overrides INCIDENT_DESK_SESSION_FILE
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,
    /// Overrides INCIDENT_DESK_DEBOUNCE_MS
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,
    /// Log filter, e.g. `debug` or `incident_desk=trace`; falls back to RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Markdown,
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo accounts, lookup tables and reports
    Seed,
    /// Sign in and persist the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and forget the persisted session
    Logout,
    /// Show what the current session would see at a path
    Route {
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// List incident reports (admin)
    Dashboard {
        /// Free-text search across every column
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        reporter: Vec<String>,
        #[arg(long)]
        patient: Vec<String>,
        #[arg(long)]
        device: Vec<String>,
        #[arg(long)]
        department: Vec<String>,
        /// Per-column substring filter as COLUMN=TEXT
        #[arg(long = "where", value_parser = parse_text_filter)]
        text_filters: Vec<(Column, String)>,
        #[arg(long, conflicts_with = "preset")]
        from: Option<NaiveDate>,
        #[arg(long, conflicts_with = "preset")]
        to: Option<NaiveDate>,
        #[arg(long, value_enum)]
        preset: Option<DatePreset>,
        #[arg(long, value_enum, default_value = "created-at")]
        sort: Column,
        #[arg(long)]
        asc: bool,
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Filter and sort the dashboard interactively from stdin (admin)
    Browse,
    /// List the values each dashboard facet offers (admin)
    Facets,
    /// Show one incident report (admin)
    Show {
        #[arg(long)]
        id: String,
    },
    /// File a new incident report (reporter)
    Submit {
        #[arg(long)]
        date: String,
        #[arg(long)]
        time: String,
        #[arg(long, default_value = "")]
        patient: String,
        #[arg(long, default_value = "")]
        device: String,
        #[arg(long, default_value = "")]
        details: String,
        #[arg(long, default_value = "")]
        symptoms: String,
        #[arg(long, default_value = "")]
        advice: String,
        #[arg(long)]
        department: String,
    },
}

fn parse_text_filter(raw: &str) -> Result<(Column, String), String> {
    let (column, text) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=TEXT, got `{raw}`"))?;
    let column = <Column as ValueEnum>::from_str(column.trim(), true)?;
    Ok((column, text.to_string()))
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs the gate for `path`. Returns the matched page only when it may render.
fn enter(state: &AuthState, path: &str) -> Option<RouteMatch> {
    let (route, decision) = gate::navigate(state, path);
    match decision {
        GateDecision::Render => Some(route),
        GateDecision::Redirect(target) => {
            println!("Redirecting to {target}.");
            None
        }
        GateDecision::Status(text) => {
            println!("{text}");
            None
        }
    }
}

/// Numbered filter chips, then the table or its empty-state message.
fn listing(dashboard: &Dashboard, visible: &[IncidentRecord]) -> String {
    let mut text = String::new();
    let chips = dashboard.chips();
    if !chips.is_empty() {
        let labels: Vec<String> = chips
            .iter()
            .enumerate()
            .map(|(i, chip)| format!("[{}] {chip}", i + 1))
            .collect();
        text.push_str(&format!("Filters: {}\n", labels.join("  ")));
    }
    match dashboard.empty_message(visible) {
        Some(message) => text.push_str(&format!("{message}\n")),
        None => text.push_str(&report::render_table(
            visible,
            dashboard.sort_spec(),
            dashboard.names(),
        )),
    }
    text.push_str(&format!(
        "Showing {} of {} reports\n",
        visible.len(),
        dashboard.records().len()
    ));
    text
}

const BROWSE_HELP: &str = "Commands: search TEXT | toggle COLUMN VALUE | sort COLUMN | \
     clear N | reset | quit";

/// Applies one interactive command. Returns false on `quit`.
async fn browse_step(dashboard: &mut Dashboard, line: &str) -> anyhow::Result<bool> {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "" => return Ok(true),
        "quit" | "exit" => return Ok(false),
        "search" => {
            let mut committed = dashboard.search_changes();
            dashboard.set_search_input(rest);
            if dashboard.search_pending() {
                println!("Searching…");
            }
            committed
                .wait_for(|value| value == rest)
                .await
                .context("search input closed")?;
        }
        "toggle" => {
            let Some((column, value)) = rest.split_once(' ') else {
                println!("usage: toggle COLUMN VALUE");
                return Ok(true);
            };
            match <Column as ValueEnum>::from_str(column, true) {
                Ok(column) => dashboard.toggle_value(column, value.trim()),
                Err(err) => {
                    println!("{err}");
                    return Ok(true);
                }
            }
        }
        "sort" => match <Column as ValueEnum>::from_str(rest, true) {
            Ok(column) => dashboard.toggle_sort(column),
            Err(err) => {
                println!("{err}");
                return Ok(true);
            }
        },
        "clear" => {
            let chips = dashboard.chips();
            let chip = rest
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| chips.get(i));
            match chip {
                Some(chip) => dashboard.remove_chip(chip),
                None => {
                    println!("No filter numbered {rest}.");
                    return Ok(true);
                }
            }
        }
        "reset" => dashboard.reset_filters(),
        _ => {
            println!("{BROWSE_HELP}");
            return Ok(true);
        }
    }

    print!("{}", listing(dashboard, &dashboard.visible()));
    Ok(true)
}

fn describe(record: &LookupRecord) -> String {
    match record {
        LookupRecord::Patient(patient) => format!(
            "{} ({}), born {}",
            patient.full_name, patient.gender, patient.date_of_birth
        ),
        LookupRecord::Device(device) => format!(
            "{} by {} (model {})",
            device.device_name, device.manufacturer, device.model
        ),
    }
}

async fn look_up(backend: &Arc<dyn Backend>, table: LookupTable, text: &str, delay: Duration) {
    if text.trim().is_empty() {
        return;
    }
    let mut lookup = IdLookup::new(table, Arc::clone(backend), delay);
    let mut rx = lookup.subscribe();
    lookup.input(text);

    let settled = tokio::time::timeout(
        delay + SETTLE_TIMEOUT,
        rx.wait_for(|state| *state != LookupState::Empty),
    )
    .await
    .is_ok_and(|changed| changed.is_ok());

    match (settled, lookup.state()) {
        (true, LookupState::Found(record)) => {
            println!("{} Details: {}", lookup.table().label(), describe(&record))
        }
        _ => println!("{} not found.", lookup.table().label()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let mut overrides = HashMap::new();
    if let Some(url) = &cli.database_url {
        overrides.insert("DATABASE_URL", url.clone());
    }
    if let Some(path) = &cli.session_file {
        overrides.insert("INCIDENT_DESK_SESSION_FILE", path.display().to_string());
    }
    if let Some(ms) = cli.debounce_ms {
        overrides.insert("INCIDENT_DESK_DEBOUNCE_MS", ms.to_string());
    }
    let config = Config::from_env_with(&overrides)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            backend::postgres::init_db(&pool).await?;
            println!("Schema ready.");
            return Ok(());
        }
        Commands::Seed => {
            backend::postgres::seed(&pool).await?;
            println!("Seed data inserted.");
            return Ok(());
        }
        _ => {}
    }

    let backend: Arc<dyn Backend> = Arc::new(PgBackend::new(pool, config.session_file.clone()));
    let store = SessionStore::start(Arc::clone(&backend));
    let state = store.resolved().await;
    info!(signed_in = state.signed_in(), role = ?state.role, "session resolved");

    match cli.command {
        Commands::InitDb | Commands::Seed => {}
        Commands::Login { email, password } => {
            if enter(&state, gate::LOGIN_ROUTE).is_none() {
                return Ok(());
            }

            let mut changes = store.subscribe();
            let mut form = LoginForm::default();
            let Some(session) = form.submit(backend.as_ref(), &email, &password).await else {
                bail!(form.error.unwrap_or_else(|| "Sign in failed".to_string()));
            };

            let signed_in = tokio::time::timeout(
                SETTLE_TIMEOUT,
                login::settled_on(&mut changes, &session),
            )
            .await
            .context("timed out waiting for the session to update")?
            .context("session store stopped")?;

            println!("Signed in as {}.", session.user.email);
            match gate::navigate(&signed_in, gate::LOGIN_ROUTE).1 {
                GateDecision::Redirect(target) => println!("Redirecting to {target}."),
                _ => println!("This account has no role assigned."),
            }
        }
        Commands::Logout => {
            backend.sign_out().await?;
            println!("Signed out.");
        }
        Commands::Route { path } => {
            let (route, decision) = gate::navigate(&state, &path);
            match decision {
                GateDecision::Render => match route {
                    RouteMatch::Page { view, param, .. } => match param {
                        Some(param) => println!("Render {view:?} ({param})"),
                        None => println!("Render {view:?}"),
                    },
                    RouteMatch::CatchAll => println!("Render nothing"),
                },
                GateDecision::Redirect(target) => println!("Redirect to {target}"),
                GateDecision::Status(text) => println!("{text}"),
            }
        }
        Commands::Dashboard {
            search,
            reporter,
            patient,
            device,
            department,
            text_filters,
            from,
            to,
            preset,
            sort,
            asc,
            format,
            out,
        } => {
            if enter(&state, "/admin").is_none() {
                return Ok(());
            }

            let mut dashboard = Dashboard::new(Arc::clone(&backend), config.debounce);
            dashboard.load().await;
            if let Some(err) = dashboard.error() {
                eprintln!("{err}");
            }

            if let Some(search) = &search {
                dashboard.commit_search(search);
            }
            for (column, values) in [
                (Column::Reporter, &reporter),
                (Column::PatientId, &patient),
                (Column::DeviceId, &device),
                (Column::Department, &department),
            ] {
                for value in values {
                    dashboard.select_value(column, value);
                }
            }
            for (column, text) in &text_filters {
                dashboard.set_text_filter(*column, text);
            }
            match preset {
                Some(preset) => dashboard.apply_preset(preset, Utc::now().date_naive()),
                None if from.is_some() || to.is_some() => dashboard.set_date_range(from, to),
                None => {}
            }
            dashboard.set_sort(SortSpec {
                column: sort,
                ascending: asc,
            });

            let visible = dashboard.visible();
            let rendered = match format {
                OutputFormat::Table => listing(&dashboard, &visible),
                OutputFormat::Markdown => report::build_report(
                    &visible,
                    &dashboard.chips(),
                    dashboard.records().len(),
                    dashboard.names(),
                ),
                OutputFormat::Csv => {
                    let mut buffer = Vec::new();
                    report::write_csv(&mut buffer, &visible, dashboard.names())?;
                    String::from_utf8(buffer).context("csv export was not utf-8")?
                }
                OutputFormat::Json => report::render_json(&visible, dashboard.names())?,
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
        }
        Commands::Browse => {
            if enter(&state, "/admin").is_none() {
                return Ok(());
            }

            let mut dashboard = Dashboard::new(Arc::clone(&backend), config.debounce);
            dashboard.load().await;
            if let Some(err) = dashboard.error() {
                eprintln!("{err}");
            }
            print!("{}", listing(&dashboard, &dashboard.visible()));
            println!("{BROWSE_HELP}");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
                if !browse_step(&mut dashboard, &line).await? {
                    break;
                }
            }
        }
        Commands::Facets => {
            if enter(&state, "/admin").is_none() {
                return Ok(());
            }

            let mut dashboard = Dashboard::new(Arc::clone(&backend), config.debounce);
            dashboard.load().await;
            if let Some(err) = dashboard.error() {
                eprintln!("{err}");
            }

            for column in Column::FACETS {
                println!("{}:", column.label());
                for value in dashboard.facets(column) {
                    println!("  {value}");
                }
            }
            println!("Date range:");
            for (key, label) in facets::date_preset_options() {
                println!("  {key}  {label}");
            }
        }
        Commands::Show { id } => {
            let path = format!("/admin/reports/{id}");
            let Some(RouteMatch::Page { param: Some(param), .. }) = enter(&state, &path) else {
                return Ok(());
            };
            let id = Uuid::parse_str(&param).with_context(|| format!("invalid report id: {param}"))?;

            match backend.fetch_report(id).await? {
                Some(record) => {
                    let names =
                        dashboard::resolve_names(backend.as_ref(), std::slice::from_ref(&record))
                            .await;
                    print!("{}", report::render_details(&record, &names));
                }
                None => println!("Report not found."),
            }
        }
        Commands::Submit {
            date,
            time,
            patient,
            device,
            details,
            symptoms,
            advice,
            department,
        } => {
            if enter(&state, "/report/new").is_none() {
                return Ok(());
            }

            look_up(&backend, LookupTable::Patients, &patient, config.debounce).await;
            look_up(&backend, LookupTable::Devices, &device, config.debounce).await;

            let mut form = ReportForm::new(ReportDraft {
                incident_date: date,
                incident_time: time,
                patient_id: patient,
                device_id: device,
                device_report_details: details,
                patient_symptoms: symptoms,
                advice_given: advice,
                concerned_department: department,
            });
            if !form.submit(backend.as_ref(), state.session.as_ref()).await {
                bail!(form.error.unwrap_or_else(|| "Submission failed".to_string()));
            }
            if let Some(message) = &form.success {
                println!("{message}");
            }
        }
    }

    Ok(())
}
