use crate::{
    backend::{
        Storage,
        local::LocalStorage,
        script::{
            DETECT_SCRIPT, EMAIL_SCRIPT, GENERATE_SCRIPT, RENDER_SCRIPT, STORAGE_SCRIPT,
            ScriptBridge,
        },
    },
    classify::DamageLabel,
    config::Config,
    notify::NotificationOrchestrator,
    pipeline::Pipeline,
    util::{ensure_dir, now_rfc3339, sha256_hex},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "damage-check")]
#[command(about = "Batch image damage reporter (vision labels + keyword filter + generated reports)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./damage-check.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Doctor {},
    /// List the eligible (.jpg/.jpeg) images in a bucket.
    List {
        #[arg(long)]
        source: String,
    },
    /// Filter a JSON array of labels offline.
    Classify {
        #[arg(long)]
        labels: PathBuf,
    },
    /// Process a single image and print its result.
    Analyze {
        #[arg(long)]
        source: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        dest: Option<String>,
    },
    Run {
        #[arg(long)]
        source: String,
        #[arg(long)]
        dest: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    Notify {
        #[arg(long)]
        source: String,
        #[arg(long)]
        dest: String,
        #[arg(long)]
        recipient: String,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let cfg = Config::load(&cfg_path)?;

    match &args.cmd {
        Command::Doctor {} => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            doctor(&cfg)
        }
        Command::List { source } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            list(&cfg, source)
        }
        Command::Classify { labels } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            classify(&cfg, labels)
        }
        Command::Analyze { source, key, dest } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            analyze(&cfg, source, key, dest.as_deref())
        }
        Command::Run {
            source,
            dest,
            out_dir,
        } => run(&args, &cfg, source, dest.as_deref(), out_dir.as_deref()),
        Command::Notify {
            source,
            dest,
            recipient,
        } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            notify(&cfg, source, dest, recipient)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("damage-check.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("damage-check.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn build_storage(cfg: &Config) -> Result<Arc<dyn Storage>> {
    match cfg.storage.backend.as_str() {
        "local" => Ok(Arc::new(LocalStorage::from_config(cfg))),
        "script" => Ok(Arc::new(ScriptBridge::new(cfg, &[STORAGE_SCRIPT])?)),
        other => Err(anyhow!("unknown storage.backend: {other}")),
    }
}

fn build_pipeline(cfg: &Config) -> Result<Pipeline> {
    let pdf = match cfg.reports.format.as_str() {
        "text" => false,
        "pdf" => true,
        other => return Err(anyhow!("unknown reports.format: {other}")),
    };

    let mut required = vec![DETECT_SCRIPT, GENERATE_SCRIPT];
    if pdf {
        required.push(RENDER_SCRIPT);
    }
    let bridge = Arc::new(ScriptBridge::new(cfg, &required)?);
    let storage = build_storage(cfg)?;

    let pipeline = Pipeline::new(cfg, storage, bridge.clone(), bridge.clone());
    Ok(if pdf {
        pipeline.with_renderer(bridge)
    } else {
        pipeline
    })
}

fn doctor(cfg: &Config) -> Result<()> {
    let scripts_dir = PathBuf::from(&cfg.paths.scripts_dir);
    let scripts: serde_json::Map<String, serde_json::Value> = [
        STORAGE_SCRIPT,
        DETECT_SCRIPT,
        GENERATE_SCRIPT,
        RENDER_SCRIPT,
        EMAIL_SCRIPT,
    ]
    .iter()
    .map(|s| (s.to_string(), serde_json::Value::Bool(scripts_dir.join(s).exists())))
    .collect();

    let probe = doctor_script(cfg);
    let bridge = match ScriptBridge::new(cfg, &[probe]).and_then(|b| b.doctor(probe)) {
        Ok(diag) => serde_json::to_value(diag)?,
        Err(e) => serde_json::json!({"ok": false, "error": format!("{e:#}")}),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "storage_backend": cfg.storage.backend,
            "local_root": cfg.storage.local_root,
            "local_root_exists": Path::new(&cfg.storage.local_root).is_dir(),
            "scripts_dir": scripts_dir,
            "scripts": scripts,
            "bridge_script": probe,
            "bridge": bridge,
        }))?
    );
    Ok(())
}

/// The storage script only runs with the script backend; every run needs
/// label detection.
pub fn doctor_script(cfg: &Config) -> &'static str {
    if cfg.storage.backend == "script" {
        STORAGE_SCRIPT
    } else {
        DETECT_SCRIPT
    }
}

fn list(cfg: &Config, source: &str) -> Result<()> {
    let storage = build_storage(cfg)?;
    let keys = storage
        .list_keys(source)
        .with_context(|| format!("listing bucket: {source}"))?;
    let eligible: Vec<&String> = keys
        .iter()
        .filter(|k| crate::util::is_eligible_image(k))
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "bucket": source,
            "listed": keys.len(),
            "eligible": eligible,
        }))?
    );
    Ok(())
}

fn classify(cfg: &Config, labels_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(labels_path)
        .with_context(|| format!("reading labels: {}", labels_path.display()))?;
    let labels: Vec<DamageLabel> =
        serde_json::from_str(&raw).with_context(|| "parsing labels JSON")?;
    let keywords = crate::classify::DamageKeywordSet::with_extra(&cfg.classification.extra_keywords);
    let classifier = crate::classify::DamageClassifier::new(keywords);
    let damage = classifier.classify(&labels);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": labels.len(),
            "damage_labels": damage,
        }))?
    );
    Ok(())
}

fn analyze(cfg: &Config, source: &str, key: &str, dest: Option<&str>) -> Result<()> {
    if !crate::util::is_eligible_image(key) {
        return Err(anyhow!("not a .jpg/.jpeg image: {key}"));
    }
    let pipeline = build_pipeline(cfg)?;
    let outcome = pipeline.process_one(source, key, dest);
    let result = outcome
        .result
        .with_context(|| format!("analyzing {source}/{key}"))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "result": result,
            "persisted": outcome.persisted,
            "persist_failure": outcome.persist_failure,
        }))?
    );
    Ok(())
}

fn run(
    args: &Args,
    cfg: &Config,
    source: &str,
    dest: Option<&str>,
    out_override: Option<&Path>,
) -> Result<()> {
    let started = now_rfc3339();
    let cfg_hash = sha256_hex(cfg.normalized_for_hash().as_bytes());
    let run_id = sha256_hex(format!("{cfg_hash}:{source}:{started}").as_bytes())[..16].to_string();

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let run_dir = out_root.join(&run_id);
    ensure_dir(&run_dir)?;
    ensure_dir(&run_dir.join("logs"))?;

    let log_path = resolve_log_path(cfg, Some(&run_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!("run_id={run_id} job={} out={}", cfg.global.job_name, run_dir.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(run_dir.join("effective-config.toml"), raw)?;
    }

    let pipeline = build_pipeline(cfg)?;
    let report = pipeline.process_all(source, dest);

    std::fs::write(
        run_dir.join("batch-report.json"),
        serde_json::to_string_pretty(&report)?,
    )?;

    let index = serde_json::json!({
        "run_id": run_id,
        "source": source,
        "destination": dest,
        "started": started,
        "finished": now_rfc3339(),
        "report": "batch-report.json",
    });
    std::fs::write(run_dir.join("index.json"), serde_json::to_string_pretty(&index)?)?;

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "run_id": run_id,
                "run_dir": run_dir,
                "eligible": report.attempted(),
                "results": report.results.len(),
                "failures": report.failures.len(),
                "persist_failures": report.persist_failures.len(),
                "enumeration_error": report.enumeration_error,
            }))?
        );
    }

    Ok(())
}

fn notify(cfg: &Config, source: &str, dest: &str, recipient: &str) -> Result<()> {
    let pipeline = build_pipeline(cfg)?;
    let notifier = Arc::new(ScriptBridge::new(cfg, &[EMAIL_SCRIPT])?);
    let orchestrator = NotificationOrchestrator::new(cfg, pipeline, notifier, dest);

    let out = orchestrator.process_and_notify(source, recipient);
    let sent = out.deliveries.iter().filter(|d| d.sent).count();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "results": out.batch.results.len(),
            "failures": out.batch.failures.len(),
            "sent": sent,
            "deliveries": out.deliveries,
        }))?
    );
    Ok(())
}

fn resolve_log_path(cfg: &Config, run_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(run_dir) = run_dir {
        return Some(run_dir.join("logs").join("damage-check.log"));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("damage-check.log"))
}
