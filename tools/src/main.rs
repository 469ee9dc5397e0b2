//! viz-runner: headless runner for the chainlens analytics core.
//!
//! Usage:
//!   viz-runner --csv data/entity_activity.csv
//!   viz-runner --db data/entity_clusters.db --sample-size 1000 --search 42
//!   viz-runner --db data/entity_clusters.db --ipc-mode
//!
//! Default mode loads the dashboard table and prints every derived
//! series; --ipc-mode reads JSON commands from stdin and answers with
//! JSON lines, standing in for the interactive presentation layer.

use anyhow::Result;
use chainlens_core::{
    aggregate::{
        entity_type_distribution, entity_volume_summary, summary_statistics,
        transaction_size_histogram, SummaryStatistics,
    },
    config::VizConfig,
    controller::ClusterController,
    record::{load_table, normalize_rows, same_entity, EntityRecord},
    source::DataSource,
    store::ClusterStore,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Load,
    Resample { sample_size: usize },
    Search { id: String },
    Hover { id: Option<String> },
    Select { id: String },
    Points,
    Stats,
    State,
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    loading: bool,
    error: Option<String>,
    sample_size: usize,
    point_count: usize,
    highlighted_id: Option<String>,
    selected: Option<EntityRecord>,
    hovered_id: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut config = match flag_value(&args, "--config") {
        Some(path) => VizConfig::load(Path::new(path))?,
        None => VizConfig::default(),
    };
    if let Some(csv) = flag_value(&args, "--csv") {
        config.table_path = csv.to_string();
    }
    if let Some(db) = flag_value(&args, "--db") {
        config.db_path = db.to_string();
    }
    if let Some(n) = flag_value(&args, "--sample-size") {
        config.cluster_sample_size = n.parse()?;
    }
    if let Some(seed) = flag_value(&args, "--seed") {
        config.sample_seed = seed.parse()?;
    }
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");

    if !ipc_mode {
        println!("chainlens — viz-runner");
        println!("  table:       {}", config.table_path);
        println!("  db:          {}", config.db_path);
        println!("  sample size: {}", config.cluster_sample_size);
        println!();
    }

    if ipc_mode {
        let mut store = ClusterStore::open(&config.db_path, config.sample_seed)?;
        store.migrate()?;
        let mut controller = ClusterController::new(config.cluster_sample_size);
        controller.load(&mut store);
        run_ipc_loop(&mut controller, &mut store)?;
        return Ok(());
    }

    if Path::new(&config.table_path).exists() {
        let rows = load_table(&config.table_path)?;
        let records = normalize_rows(&rows, config.dashboard_row_cap);
        print_dashboard(&records);
    } else {
        println!("table {} not found, skipping dashboard", config.table_path);
    }

    if Path::new(&config.db_path).exists() {
        let mut store = ClusterStore::open(&config.db_path, config.sample_seed)?;
        store.migrate()?;
        let mut controller = ClusterController::new(config.cluster_sample_size);
        controller.load(&mut store);

        if let Some(id) = flag_value(&args, "--search") {
            controller.search_by_id(&mut store, id);
        }
        print_cluster_view(&controller, &store)?;
    }

    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

/// Render a mean that may carry the empty-set NaN sentinel.
fn fmt_stat(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.4}")
    } else {
        "—".to_string()
    }
}

fn print_dashboard(records: &[EntityRecord]) {
    println!("== Dashboard ({} entities) ==", records.len());
    if records.is_empty() {
        println!("No data available");
        return;
    }

    println!("-- Entity type distribution --");
    for slice in entity_type_distribution(records) {
        println!("  {:<16} {:>6}  {:>5.1}%", slice.category, slice.count, slice.percentage);
    }

    println!("-- Transaction size histogram (log10) --");
    for bin in transaction_size_histogram(records) {
        if bin.count > 0 {
            println!(
                "  [{:>8.4}, {:>8.4})  {:>6}  ({:.4}–{:.4} BTC)",
                bin.x0,
                bin.x1,
                bin.count,
                10f64.powf(bin.x0),
                10f64.powf(bin.x1),
            );
        }
    }

    let stats = summary_statistics(records);
    println!("-- Summary statistics --");
    println!("  total volume:      {:.4}", stats.total_volume);
    println!("  avg tx size:       {}", fmt_stat(stats.avg_transaction_size));
    println!("  total txs:         {}", stats.total_transactions);
    println!("  peak tx rate:      {:.2}/hr", stats.peak_tx_rate);
    println!(
        "  in/out degree:     {} / {}",
        fmt_stat(stats.avg_in_degree),
        fmt_stat(stats.avg_out_degree)
    );
    println!("  chain depth:       {}", fmt_stat(stats.avg_chain_depth));
    println!(
        "  large/micro mix:   {} / {}",
        fmt_stat(stats.large_tx_ratio),
        fmt_stat(stats.micro_tx_ratio)
    );
    println!("  business hours:    {}", fmt_stat(stats.business_hours_activity));
    println!("  max tx size:       {:.4}", stats.max_transaction_size);
    println!("  avg tx rate:       {}", fmt_stat(stats.avg_tx_rate));

    let volume = entity_volume_summary(records);
    println!("-- Volume summary --");
    println!("  entities:          {}", volume.total_entities);
    println!("  total volume:      {:.4}", volume.total_volume);
    println!("  avg transactions:  {}", fmt_stat(volume.average_transactions));
    println!("  median txs:        {}", fmt_stat(volume.median_transactions));
}

fn print_cluster_view(controller: &ClusterController, store: &ClusterStore) -> Result<()> {
    let state = controller.state();
    println!("== Cluster view ==");
    if let Some(error) = &state.error {
        println!("  error: {error}");
    }
    println!("  working set:  {} points", state.working_set.len());

    let points = controller.projected_points();
    if let Some(point) = points.iter().find(|p| p.highlighted) {
        println!(
            "  highlighted:  {} at ({:.2}, {:.2}, {:.2})",
            point.entity_id, point.x, point.y, point.z
        );
    }
    if let Some(selected) = &state.selected {
        println!("  selected:     {}", selected.entity_id);
        println!("    received:   {:.8} BTC", selected.total_btc_received);
        println!("    spent:      {:.8} BTC", selected.total_btc_spent);
        println!("    txs:        {}", selected.derived_transaction_count());
        if let Some(cluster) = selected.cluster {
            println!("    cluster:    {cluster}");
        }
        if let Some(p) = selected.membership_probability() {
            println!("    membership: {p:.4}");
        }
    }

    println!("-- Per-cluster statistics --");
    for stats in store.cluster_stats()? {
        println!(
            "  cluster {:>2}: {:>6} entities, avg received {:.4}, avg spent {:.4}",
            stats.cluster, stats.count, stats.avg_btc_received, stats.avg_btc_spent
        );
    }

    let bounds = store.visualization_stats()?;
    println!(
        "  axis bounds: pc1 [{:.3}, {:.3}]  pc2 [{:.3}, {:.3}]  pc3 [{:.3}, {:.3}]",
        bounds.min_pc1, bounds.max_pc1, bounds.min_pc2, bounds.max_pc2, bounds.min_pc3,
        bounds.max_pc3
    );
    Ok(())
}

fn run_ipc_loop(controller: &mut ClusterController, store: &mut ClusterStore) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{err_json}")?;
                stdout.flush()?;
                continue;
            }
        };

        let response = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Load => {
                controller.load(store);
                ui_state(controller)
            }
            IpcCommand::Resample { sample_size } => {
                controller.resample(store, sample_size);
                ui_state(controller)
            }
            IpcCommand::Search { id } => {
                controller.search_by_id(store, &id);
                ui_state(controller)
            }
            IpcCommand::Hover { id } => {
                let point = id.and_then(|id| {
                    controller
                        .state()
                        .working_set
                        .iter()
                        .find(|r| same_entity(&r.entity_id, &id))
                        .cloned()
                });
                controller.hover(point);
                ui_state(controller)
            }
            IpcCommand::Select { id } => {
                let point = controller
                    .state()
                    .working_set
                    .iter()
                    .find(|r| same_entity(&r.entity_id, &id))
                    .cloned();
                if let Some(point) = point {
                    controller.select(point);
                }
                ui_state(controller)
            }
            IpcCommand::Points => serde_json::to_value(controller.projected_points())?,
            IpcCommand::Stats => {
                let stats = summary_statistics(&controller.state().working_set);
                serde_json::to_value(sanitize_stats(stats))?
            }
            IpcCommand::State => ui_state(controller),
        };

        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }

    Ok(())
}

fn ui_state(controller: &ClusterController) -> serde_json::Value {
    let state = controller.state();
    serde_json::to_value(UiState {
        loading: state.loading,
        error: state.error.clone(),
        sample_size: state.sample_size,
        point_count: state.working_set.len(),
        highlighted_id: state.highlighted_id.clone(),
        selected: state.selected.clone(),
        hovered_id: state.hovered.as_ref().map(|r| r.entity_id.clone()),
    })
    .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
}

/// JSON has no NaN; the empty-set sentinel renders as 0 downstream.
fn sanitize_stats(mut stats: SummaryStatistics) -> SummaryStatistics {
    for value in [
        &mut stats.avg_transaction_size,
        &mut stats.avg_in_degree,
        &mut stats.avg_out_degree,
        &mut stats.avg_chain_depth,
        &mut stats.large_tx_ratio,
        &mut stats.micro_tx_ratio,
        &mut stats.business_hours_activity,
        &mut stats.avg_tx_rate,
    ] {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    stats
}
