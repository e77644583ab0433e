use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use twyfels::config::Config;
use twyfels::context::AppContext;
use twyfels::db::{self, DocumentStore, SqliteStore};
use twyfels::logging;
use twyfels::storage::{create_object_store, ObjectStore, Uploader};
use twyfels::timeline::{export_timeline_js, TimelineEvent, TimelineEventData, TimelineMirror, TimelineRepository};
use twyfels::tree::{
    ChartRenderer, FamilyTree, Gender, HtmlChartRenderer, JsonChartRenderer, PersonDataUpdate, PersonId,
};

struct Cli {
    config_path: Option<PathBuf>,
    command: Vec<String>,
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut command = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" if command.is_empty() => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" if command.is_empty() => {
                println!("twyfels {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" if command.is_empty() => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            _ => command.push(args[i].clone()),
        }
        i += 1;
    }

    if command.is_empty() {
        print_help();
        std::process::exit(1);
    }

    Cli { config_path, command }
}

fn print_help() {
    println!(
        r#"twyfels - family history timeline and tree

USAGE:
    twyfels [OPTIONS] <COMMAND>

COMMANDS:
    tree list                           List persons
    tree show <id>                      Show one person
    tree check                          Report inconsistent links
    tree render <output> [--json]       Write the family chart (HTML or JSON)
    tree set-mother <id> <mother|->     Set or clear ("-") a mother
    tree set-father <id> <father|->     Set or clear ("-") a father
    tree add-spouse <a> <b>             Link two spouses
    tree remove-spouse <a> <b>          Unlink two spouses
    tree add-child <parent> <child>     Add a child (slot from parent's gender)
    tree remove-child <parent> <child>  Remove a child
    tree set-data <id> [--name N] [--surname S] [--birthday B]
                       [--avatar A] [--gender M|F]
    tree delete <id>                    Delete a person

    timeline list                       List events
    timeline add --year Y --headline H [--month M] [--day D] [--text T]
                 [--group G] [--media FILE] [--thumbnail FILE]
    timeline delete <id>                Delete an event
    timeline export <output>            Write a TimelineJS data file

    upload <object-path> [file]         Print the object's URL, uploading if absent
    watch tree|timeline [--interval N]  Follow changes until Ctrl-C

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    TWYFELS_CONFIG      Path to config file (overrides default location)
    TWYFELS_LOG         Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/twyfels/config.toml"#
    );
}

/// Everything a command needs, built once per run.
struct App {
    config: Config,
    store: Arc<SqliteStore>,
    ctx: AppContext,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let store = db::open(&config.database)
            .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
        Ok(Self {
            config,
            store,
            ctx: AppContext::new(),
        })
    }

    fn documents(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    fn uploader(&self) -> Result<Uploader> {
        let objects: Arc<dyn ObjectStore> = Arc::from(create_object_store(&self.config.storage)?);
        Ok(Uploader::new(objects, self.ctx.clone(), &self.config.storage.images_prefix))
    }

    fn tree(&self) -> FamilyTree {
        FamilyTree::new(
            self.documents(),
            self.ctx.clone(),
            &self.config.collections.tree,
            self.config.chart.clone(),
        )
    }

    fn timeline(&self) -> Result<TimelineRepository> {
        Ok(TimelineRepository::new(
            self.documents(),
            self.uploader()?,
            self.ctx.clone(),
            &self.config.collections.timeline,
            self.config.timeline.clone(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(Some(Config::log_dir()));

    let config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let app = App::open(config)?;
    let args: Vec<&str> = cli.command.iter().map(String::as_str).collect();

    let result = match args.as_slice() {
        ["tree", rest @ ..] => run_tree(&app, rest),
        ["timeline", rest @ ..] => run_timeline(&app, rest),
        ["upload", path] => upload(&app, path, None),
        ["upload", path, file] => upload(&app, path, Some(Path::new(file))),
        ["watch", rest @ ..] => watch(&app, rest).await,
        _ => {
            print_help();
            bail!("Unknown command: {}", cli.command.join(" "))
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

fn parent_arg(value: &str) -> Option<&str> {
    (value != "-").then_some(value)
}

fn run_tree(app: &App, args: &[&str]) -> Result<()> {
    let tree = app.tree();

    match args {
        ["list"] => {
            for person in tree.list()? {
                println!(
                    "{:<20} {:<30} mother={} father={}",
                    person.id,
                    person.data.display_name(),
                    person.rels.mother.as_ref().map(PersonId::as_str).unwrap_or("-"),
                    person.rels.father.as_ref().map(PersonId::as_str).unwrap_or("-"),
                );
            }
        }
        ["show", id] => {
            let id = PersonId::new(*id)?;
            let person = tree
                .find_person(&id)?
                .ok_or_else(|| anyhow!("No person with id {}", id))?;
            println!("{}", serde_json::to_string_pretty(&person)?);
        }
        ["check"] => {
            let violations = tree.check_consistency()?;
            if violations.is_empty() {
                println!("No inconsistent links");
            } else {
                for violation in &violations {
                    println!("{}", violation);
                }
                bail!("{} inconsistent links", violations.len());
            }
        }
        ["render", output, flags @ ..] => {
            let renderer: Box<dyn ChartRenderer> = match flags {
                [] => Box::new(HtmlChartRenderer::new(&app.config.chart)),
                ["--json"] => Box::new(JsonChartRenderer),
                _ => bail!("Unknown render option: {}", flags.join(" ")),
            };
            let output = renderer.output_path(Path::new(output));
            let mut tree = tree;
            tree.watch()?;
            let file = File::create(&output).with_context(|| format!("Failed to create {}", output.display()))?;
            let mut out = BufWriter::new(file);
            tree.render(renderer.as_ref(), &mut out)?;
            println!("Wrote {} persons to {}", tree.persons().len(), output.display());
        }
        ["set-mother", id, mother] => tree.set_mother(id, parent_arg(mother))?,
        ["set-father", id, father] => tree.set_father(id, parent_arg(father))?,
        ["add-spouse", a, b] => tree.add_spouse([*a, *b])?,
        ["remove-spouse", a, b] => tree.remove_spouse([*a, *b])?,
        ["add-child", parent, child] => tree.add_child(parent, child)?,
        ["remove-child", parent, child] => tree.remove_child(parent, child)?,
        ["set-data", id, flags @ ..] => {
            let update = parse_person_update(flags)?;
            if update.is_empty() {
                bail!("set-data needs at least one field");
            }
            let person = tree.update_person_data(id, update)?;
            println!("{}", serde_json::to_string_pretty(&person)?);
        }
        ["delete", id] => tree.delete_person(id)?,
        _ => bail!("Unknown tree command: {}", args.join(" ")),
    }
    Ok(())
}

fn parse_person_update(flags: &[&str]) -> Result<PersonDataUpdate> {
    let mut update = PersonDataUpdate::default();
    for pair in flags.chunks(2) {
        let [flag, value] = pair else {
            bail!("{} requires a value", pair[0]);
        };
        let value = value.to_string();
        match *flag {
            "--name" => update.name = Some(value),
            "--surname" => update.surname = Some(value),
            "--birthday" => update.birthday = Some(value),
            "--avatar" => update.avatar = Some(value),
            "--gender" => {
                update.gender = Some(match value.as_str() {
                    "M" | "m" => Gender::M,
                    "F" | "f" => Gender::F,
                    other => bail!("Gender must be M or F, got {}", other),
                })
            }
            other => bail!("Unknown option: {}", other),
        }
    }
    Ok(update)
}

fn run_timeline(app: &App, args: &[&str]) -> Result<()> {
    let timeline = app.timeline()?;

    match args {
        ["list"] => {
            for event in timeline.list()? {
                let date = &event.data.start_date;
                println!(
                    "{:<22} {:>5}-{:02}-{:02} {:<12} {}",
                    event.id.as_deref().unwrap_or("-"),
                    date.year,
                    date.month.unwrap_or(0),
                    date.day.unwrap_or(0),
                    event.data.group,
                    event.data.text.headline,
                );
            }
        }
        ["add", flags @ ..] => {
            let mut event = parse_timeline_event(flags)?;
            timeline.save(&mut event)?;
            println!("{}", event.id.as_deref().unwrap_or_default());
        }
        ["delete", id] => {
            let event = TimelineEvent {
                id: Some(id.to_string()),
                ..Default::default()
            };
            timeline.delete(&event)?;
        }
        ["export", output] => {
            let events = timeline.list()?;
            let count = export_timeline_js(&events, Path::new(output))?;
            println!("Exported {} events to {}", count, output);
        }
        _ => bail!("Unknown timeline command: {}", args.join(" ")),
    }
    Ok(())
}

fn parse_timeline_event(flags: &[&str]) -> Result<TimelineEvent> {
    let mut year = None;
    let mut data = TimelineEventData::default();
    let mut event = TimelineEvent::default();

    for pair in flags.chunks(2) {
        let [flag, value] = pair else {
            bail!("{} requires a value", pair[0]);
        };
        match *flag {
            "--year" => year = Some(value.parse().with_context(|| format!("Invalid year: {}", value))?),
            "--month" => {
                data.start_date.month = Some(value.parse().with_context(|| format!("Invalid month: {}", value))?)
            }
            "--day" => data.start_date.day = Some(value.parse().with_context(|| format!("Invalid day: {}", value))?),
            "--headline" => data.text.headline = value.to_string(),
            "--text" => data.text.text = value.to_string(),
            "--group" => data.group = value.to_string(),
            "--media" => event.media_file = Some(PathBuf::from(value)),
            "--thumbnail" => event.thumbnail_file = Some(PathBuf::from(value)),
            other => bail!("Unknown option: {}", other),
        }
    }

    data.start_date.year = year.ok_or_else(|| anyhow!("--year is required"))?;
    if data.text.headline.is_empty() {
        bail!("--headline is required");
    }
    event.data = data;
    Ok(event)
}

fn upload(app: &App, path: &str, file: Option<&Path>) -> Result<()> {
    let uploader = app.uploader()?;
    let url = uploader.resolve_url(path, file)?;
    println!("{}", url);
    Ok(())
}

async fn watch(app: &App, args: &[&str]) -> Result<()> {
    let (target, flags) = match args {
        [target, flags @ ..] => (*target, flags),
        [] => bail!("watch needs a target: tree or timeline"),
    };
    let interval_secs: u64 = match flags {
        [] => 2,
        ["--interval", secs] => secs.parse().with_context(|| format!("Invalid interval: {}", secs))?,
        _ => bail!("Unknown watch option: {}", flags.join(" ")),
    };

    enum Watched {
        Tree(FamilyTree),
        Timeline(TimelineMirror),
    }

    let mut watched = match target {
        "tree" => {
            let mut tree = app.tree();
            tree.watch()?;
            Watched::Tree(tree)
        }
        "timeline" => Watched::Timeline(app.timeline()?.subscribe()?),
        other => bail!("Cannot watch {}: expected tree or timeline", other),
    };

    let report = |watched: &Watched| match watched {
        Watched::Tree(tree) => println!("tree: {} persons", tree.persons().len()),
        Watched::Timeline(mirror) => println!("timeline: {} events", mirror.len()),
    };
    report(&watched);
    tracing::info!(collection = target, interval_secs, "Watching for changes");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Stopped");
                break;
            }
            _ = interval.tick() => {
                app.store.poll_external_changes()?;
                let changed = match &mut watched {
                    Watched::Tree(tree) => tree.refresh(),
                    Watched::Timeline(mirror) => mirror.refresh(),
                };
                if changed {
                    report(&watched);
                }
                if let Some(message) = app.ctx.errors.take() {
                    eprintln!("Error: {}", message);
                }
            }
        }
    }
    Ok(())
}
