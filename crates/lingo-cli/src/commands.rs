use std::io::{self, Read};
use std::path::Path;

use anyhow::{bail, Context as _};
use colored::Colorize;
use lingo_driver::conformance;
use lingo_driver::{
    AttributeMap, DriverRegistry, EntityRef, IndexMode, JsonTranslationDriver, Language, SyncWorker,
    TranslationConfig, TranslationDriver, WorkerStats,
};
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::info;

use crate::cli::*;

const DEFAULT_CONFIG: &str = "lingo.toml";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let ctx = Context::new(config, cli.format)?;
    match cli.command {
        Command::Get(args) => ctx.cmd_get(args),
        Command::Store(args) => ctx.cmd_write(args, WriteMode::Store),
        Command::Patch(args) => ctx.cmd_write(args, WriteMode::Patch),
        Command::Delete(args) => ctx.cmd_delete(args),
        Command::Languages(args) => ctx.cmd_languages(args),
        Command::Models(args) => ctx.cmd_models(args),
        Command::Drain => ctx.cmd_drain(),
        Command::Reindex(args) => ctx.cmd_reindex(args),
        Command::CheckDrivers(args) => ctx.cmd_check_drivers(args),
        Command::Config => {
            print!("{}", ctx.config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<TranslationConfig> {
    let mut config = match &cli.config {
        Some(path) => TranslationConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => TranslationConfig::load(Path::new(DEFAULT_CONFIG))?,
        None => TranslationConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.json.base_path = root.clone();
    }
    if cli.scan {
        config.json.index_mode = IndexMode::Scan;
    }
    Ok(config)
}

#[derive(Clone, Copy)]
enum WriteMode {
    Store,
    Patch,
}

struct Context {
    config: TranslationConfig,
    format: OutputFormat,
    runtime: Runtime,
}

/// An open JSON driver plus the worker its queue feeds, if any.
struct Session {
    driver: JsonTranslationDriver,
    worker: Option<SyncWorker>,
}

impl Context {
    fn new(config: TranslationConfig, format: OutputFormat) -> anyhow::Result<Self> {
        let runtime = Runtime::new().context("failed to start async runtime")?;
        Ok(Self { config, format, runtime })
    }

    /// Open the configured driver and apply any tasks it recovered, so
    /// reads see a settled index.
    fn open(&self) -> anyhow::Result<Session> {
        let (driver, worker) = JsonTranslationDriver::open(&self.config)
            .with_context(|| format!("failed to open storage at {}", self.config.json.base_path.display()))?;
        let mut session = Session { driver, worker };
        self.settle(&mut session);
        Ok(session)
    }

    /// Drain the session's worker. Inline queues have nothing to drain.
    fn settle(&self, session: &mut Session) -> WorkerStats {
        let Some(worker) = session.worker.as_mut() else {
            return WorkerStats::default();
        };
        let stats = self.runtime.block_on(worker.drain());
        if stats.failed > 0 {
            eprintln!("{} {} sync task(s) failed and remain pending", "!".yellow().bold(), stats.failed);
        }
        stats
    }

    fn cmd_get(&self, args: GetArgs) -> anyhow::Result<()> {
        let session = self.open()?;
        let entity = entity(&args.entity)?;
        let attributes = session.driver.get(&entity, &language(&args.language)?)?;
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&attributes)?),
            OutputFormat::Text if attributes.is_empty() => {
                println!("No {} translation for {}.", args.language.yellow(), entity.to_string().bold());
            }
            OutputFormat::Text => {
                for (name, value) in attributes.iter() {
                    match value {
                        Some(value) => println!("{}: {}", name.bold(), value),
                        None => println!("{}: {}", name.bold(), "null".dimmed()),
                    }
                }
            }
        }
        Ok(())
    }

    fn cmd_write(&self, args: WriteArgs, mode: WriteMode) -> anyhow::Result<()> {
        let attributes = read_attributes(args.attributes.as_deref())?;
        let entity = entity(&args.entity)?;
        let language = language(&args.language)?;

        let mut session = self.open()?;
        let verb = match mode {
            WriteMode::Store => {
                session.driver.store(&entity, &language, &attributes)?;
                "Stored"
            }
            WriteMode::Patch => {
                session.driver.patch(&entity, &language, &attributes)?;
                "Patched"
            }
        };
        self.settle(&mut session);
        println!("{} {verb} {} ({})", "✓".green().bold(), entity.to_string().bold(), language.as_str().yellow());
        Ok(())
    }

    fn cmd_delete(&self, args: DeleteArgs) -> anyhow::Result<()> {
        let entity = entity(&args.entity)?;
        let languages = args.language.iter().map(|l| language(l)).collect::<anyhow::Result<Vec<_>>>()?;
        let attributes: Vec<&str> = args.attribute.iter().map(String::as_str).collect();

        let mut session = self.open()?;
        let driver = &session.driver;
        if !attributes.is_empty() {
            if languages.is_empty() {
                driver.delete_attributes(&entity, &attributes, None)?;
            } else {
                for language in &languages {
                    driver.delete_attributes(&entity, &attributes, Some(language))?;
                }
            }
            println!("{} Deleted {} from {}", "✓".green().bold(), attributes.join(", "), entity.to_string().bold());
        } else if !languages.is_empty() {
            driver.delete_languages(&entity, &languages)?;
            println!("{} Deleted {} translation(s) of {}", "✓".green().bold(), languages.len(), entity.to_string().bold());
        } else {
            driver.delete_all(&entity)?;
            println!("{} Deleted every translation of {}", "✓".green().bold(), entity.to_string().bold());
        }
        self.settle(&mut session);
        Ok(())
    }

    fn cmd_languages(&self, args: EntityArgs) -> anyhow::Result<()> {
        let session = self.open()?;
        let languages = session.driver.available_languages(&entity(&args)?)?;
        self.print_list(&languages, "No translations.")
    }

    fn cmd_models(&self, args: ModelsArgs) -> anyhow::Result<()> {
        let session = self.open()?;
        let ids = session
            .driver
            .models_available_in_language(&args.entity_type, &language(&args.language)?)?;
        self.print_list(&ids, "No models.")
    }

    fn cmd_drain(&self) -> anyhow::Result<()> {
        let session = self.open()?;
        let Some(worker) = &session.worker else {
            println!("Queue is {}; nothing to drain.", session.driver.queue_kind().cyan());
            return Ok(());
        };
        let stats = worker.stats();
        info!(processed = stats.processed, failed = stats.failed, "drained sync queue");
        println!(
            "{} Applied {} sync task(s): {} added, {} removed, {} failed",
            "✓".green().bold(),
            stats.processed,
            stats.added,
            stats.removed,
            stats.failed
        );
        if stats.failed > 0 {
            bail!("{} sync task(s) could not be applied", stats.failed);
        }
        Ok(())
    }

    fn cmd_reindex(&self, args: ReindexArgs) -> anyhow::Result<()> {
        let session = self.open()?;
        let report = session.driver.rebuild_index(&args.entity_types)?;
        println!(
            "{} Reindexed {} type(s): {} entries across {} language(s)",
            "✓".green().bold(),
            report.entity_types,
            report.entries,
            report.languages.len()
        );
        for language in &report.languages {
            println!("  {}", language.as_str().yellow());
        }
        Ok(())
    }

    fn cmd_check_drivers(&self, args: CheckDriversArgs) -> anyhow::Result<()> {
        // The json driver spawns its worker on the ambient runtime.
        let _guard = self.runtime.enter();
        let registry = DriverRegistry::new(self.config.clone());
        let names = if args.drivers.is_empty() {
            registry.available_drivers()
        } else {
            args.drivers
        };

        let mut failed = 0;
        for name in &names {
            let driver = match registry.driver(Some(name)) {
                Ok(driver) => driver,
                Err(e) => {
                    println!("{} {}: {e}", "✗".red().bold(), name.bold());
                    failed += 1;
                    continue;
                }
            };
            let report = conformance::check(driver.as_ref());
            let mark = if report.passed() { "✓".green().bold() } else { "✗".red().bold() };
            println!("{mark} {}", report.driver.bold());
            for check in &report.checks {
                match &check.failure {
                    None => println!("    {} {}", "ok".green(), check.name),
                    Some(reason) => println!("    {} {}: {reason}", "FAIL".red(), check.name),
                }
            }
            if !report.passed() {
                failed += 1;
            }
        }
        if failed > 0 {
            bail!("{failed} of {} driver(s) failed", names.len());
        }
        Ok(())
    }

    fn print_list<T>(&self, items: &[T], empty: &str) -> anyhow::Result<()>
    where
        T: Serialize + std::fmt::Display,
    {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
            OutputFormat::Text if items.is_empty() => println!("{empty}"),
            OutputFormat::Text => {
                for item in items {
                    println!("{item}");
                }
            }
        }
        Ok(())
    }
}

fn entity(args: &EntityArgs) -> anyhow::Result<EntityRef> {
    Ok(EntityRef::new(args.entity_type.as_str(), args.entity_id.as_str())?)
}

fn language(tag: &str) -> anyhow::Result<Language> {
    Ok(Language::new(tag)?)
}

/// Parse a JSON object of attributes from `source`, or stdin for `None`/`-`.
fn read_attributes(source: Option<&str>) -> anyhow::Result<AttributeMap> {
    let text = match source {
        Some(text) if text != "-" => text.to_string(),
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("failed to read attributes from stdin")?;
            buf
        }
    };
    serde_json::from_str(&text).context("attributes must be a JSON object of strings or nulls")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingo_driver::QueueKind;
    use std::path::PathBuf;

    fn context(root: &Path, kind: QueueKind) -> Context {
        let mut config = TranslationConfig::default();
        config.json.base_path = root.to_path_buf();
        config.queue.kind = kind;
        Context::new(config, OutputFormat::Text).unwrap()
    }

    fn article(id: &str) -> EntityArgs {
        EntityArgs { entity_type: "App\\Article".into(), entity_id: id.into() }
    }

    fn write(id: &str, language: &str, json: &str) -> WriteArgs {
        WriteArgs { entity: article(id), language: language.into(), attributes: Some(json.into()) }
    }

    fn models(ctx: &Context, language: &str) -> Vec<String> {
        let session = ctx.open().unwrap();
        session
            .driver
            .models_available_in_language("App\\Article", &Language::new(language).unwrap())
            .unwrap()
    }

    // ---- attribute parsing ----

    #[test]
    fn attributes_accept_strings_and_nulls() {
        let attrs = read_attributes(Some(r#"{"title":"Hi","body":null}"#)).unwrap();
        assert_eq!(attrs.get("title"), Some(Some("Hi")));
        assert_eq!(attrs.get("body"), Some(None));
    }

    #[test]
    fn attributes_reject_non_objects() {
        assert!(read_attributes(Some("[1, 2]")).is_err());
        assert!(read_attributes(Some(r#"{"n": 3}"#)).is_err());
    }

    // ---- commands ----

    #[test]
    fn write_then_delete_updates_index() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), QueueKind::Inline);

        ctx.cmd_write(write("1", "en", r#"{"title":"Hello"}"#), WriteMode::Store).unwrap();
        ctx.cmd_write(write("1", "en", r#"{"body":"Text"}"#), WriteMode::Patch).unwrap();
        ctx.cmd_write(write("2", "en", r#"{"title":"Other"}"#), WriteMode::Store).unwrap();
        assert_eq!(models(&ctx, "en"), vec!["1", "2"]);

        let session = ctx.open().unwrap();
        let entity = EntityRef::new("App\\Article", "1").unwrap();
        let attrs = session.driver.get(&entity, &Language::new("en").unwrap()).unwrap();
        assert_eq!(attrs.len(), 2);

        ctx.cmd_delete(DeleteArgs {
            entity: article("1"),
            language: vec![],
            attribute: vec!["title".into(), "body".into()],
        })
        .unwrap();
        assert_eq!(models(&ctx, "en"), vec!["2"]);
    }

    #[test]
    fn channel_queue_is_settled_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), QueueKind::Channel);
        ctx.cmd_write(write("5", "fr", r#"{"title":"Salut"}"#), WriteMode::Store).unwrap();
        assert_eq!(models(&ctx, "fr"), vec!["5"]);
    }

    #[test]
    fn journaled_queue_survives_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), QueueKind::Journaled);
        ctx.cmd_write(write("3", "de", r#"{"title":"Hallo"}"#), WriteMode::Store).unwrap();
        ctx.cmd_drain().unwrap();
        assert_eq!(models(&ctx, "de"), vec!["3"]);

        let journal: PathBuf = ctx.config.journal_path();
        assert!(journal.exists());
    }

    #[test]
    fn reindex_restores_a_wiped_index() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), QueueKind::Inline);
        ctx.cmd_write(write("1", "en", r#"{"title":"Hello"}"#), WriteMode::Store).unwrap();
        std::fs::remove_dir_all(dir.path().join("meta")).unwrap();
        assert!(models(&ctx, "en").is_empty());

        ctx.cmd_reindex(ReindexArgs { entity_types: vec!["App\\Article".into()] }).unwrap();
        assert_eq!(models(&ctx, "en"), vec!["1"]);
    }

    #[test]
    fn check_drivers_passes_for_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), QueueKind::Inline);
        ctx.cmd_check_drivers(CheckDriversArgs { drivers: vec![] }).unwrap();
    }

    #[test]
    fn check_drivers_fails_for_unknown_driver() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), QueueKind::Inline);
        assert!(ctx.cmd_check_drivers(CheckDriversArgs { drivers: vec!["mysql".into()] }).is_err());
    }
}
