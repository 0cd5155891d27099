use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use obfumap::cache::{Adaptation, AdaptationCache, KvStore};
use obfumap::container::Container;
use obfumap::matcher::{Matcher, ResolutionMap};
use obfumap::rule::{ClassRule, RuleSet};

/// CLI arguments for obfumap execution.
#[derive(Parser, Debug)]
#[command(
    name = "obfumap",
    about = "Locate renamed classes in a JAR by structural rules.",
    version
)]
struct Cli {
    /// JSON file holding the rule list.
    #[arg(long, value_name = "PATH")]
    rules: PathBuf,
    /// Zip/JAR container to scan.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Where to write the resolved mapping; `-` for stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// JSON file backing the adaptation cache.
    #[arg(long, value_name = "PATH", requires = "app_version")]
    cache: Option<PathBuf>,
    /// Version key the cached mapping is gated by.
    #[arg(long, value_name = "N")]
    app_version: Option<i64>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }
    if !cli.rules.exists() {
        anyhow::bail!("rules not found: {}", cli.rules.display());
    }

    let rules = load_rules(&cli.rules)?;
    let started_at = Instant::now();

    let scan = || -> Result<ResolutionMap> {
        let mut container = Container::open(&cli.input)?;
        Matcher::new(&rules).scan(container.modules())
    };

    let outcome = match (&cli.cache, cli.app_version) {
        (Some(cache_path), Some(version)) => {
            let store = FileStore::load(cache_path)?;
            let mut cache = AdaptationCache::new(store);
            let outcome = cache.resolve(&rules, version, scan)?;
            cache.into_store().save()?;
            outcome
        }
        _ => {
            let mapping = scan()?;
            classify(&rules, mapping)
        }
    };

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, outcome.mapping())
        .context("failed to serialize resolved mapping")?;
    writer
        .write_all(b"\n")
        .context("failed to write resolved mapping")?;

    if !cli.quiet {
        if let Adaptation::Failed { unmatched, .. } = &outcome {
            for name in unmatched {
                eprintln!("unmatched rule: {name}");
            }
        }
    }
    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} rules={} resolved={}",
            started_at.elapsed().as_millis(),
            rules.len(),
            outcome.mapping().len()
        );
    }

    Ok(())
}

fn load_rules(path: &Path) -> Result<RuleSet> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let rules: Vec<ClassRule> = serde_json::from_reader(file)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    RuleSet::new(rules)
}

fn classify(rules: &RuleSet, mapping: ResolutionMap) -> Adaptation {
    if mapping.len() == rules.len() {
        return Adaptation::Adapted(mapping);
    }
    let unmatched = rules
        .iter()
        .filter(|rule| !mapping.contains_key(&rule.name))
        .map(|rule| rule.name.clone())
        .collect();
    Adaptation::Failed {
        resolved: mapping,
        unmatched,
    }
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

/// Key-value store backed by one JSON file, written on save.
struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let data = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    fn save(&self) -> Result<()> {
        let data =
            serde_json::to_string_pretty(&self.entries).context("serialize cache store")?;
        fs::write(&self.path, data)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str, default: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_flags_unmatched_rules() {
        let rules = RuleSet::new(vec![
            ClassRule {
                name: "Found".to_string(),
                ..ClassRule::default()
            },
            ClassRule {
                name: "Missing".to_string(),
                ..ClassRule::default()
            },
        ])
        .expect("rule set");
        let mut mapping = ResolutionMap::new();
        mapping.insert("Found".to_string(), "pkg.Found".to_string());

        match classify(&rules, mapping) {
            Adaptation::Failed { unmatched, .. } => {
                assert_eq!(unmatched, vec!["Missing".to_string()]);
            }
            other => panic!("expected failed outcome, got {other:?}"),
        }
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("cache.json");

        let mut store = FileStore::load(&path).expect("load empty");
        store.set("adaptation_version", "42");
        store.save().expect("save");

        let store = FileStore::load(&path).expect("reload");
        assert_eq!(store.get("adaptation_version", "0"), "42");
        assert_eq!(store.get("missing", "fallback"), "fallback");
    }
}
