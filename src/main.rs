use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use hikelog::config::Config;
use hikelog::db::{Database, NewTrip, TripUpdate};
use hikelog::photos::{ImageToolConverter, PhotoPipeline};
use hikelog::{gpx, importer, logging, photos, timestamp};

struct CliOptions {
    config_path: Option<PathBuf>,
    zone: Option<String>,
    start: Option<String>,
    end: Option<String>,
    title: Option<String>,
    brief: Option<String>,
    description: Option<String>,
    limit: Option<usize>,
    positional: Vec<String>,
}

fn parse_args() -> CliOptions {
    let args: Vec<String> = std::env::args().collect();
    let mut options = CliOptions {
        config_path: None,
        zone: None,
        start: None,
        end: None,
        title: None,
        brief: None,
        description: None,
        limit: None,
        positional: Vec::new(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("hikelog {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                options.config_path = Some(PathBuf::from(take_value(&args, &mut i)));
            }
            "--zone" => options.zone = Some(take_value(&args, &mut i)),
            "--start" => options.start = Some(take_value(&args, &mut i)),
            "--end" => options.end = Some(take_value(&args, &mut i)),
            "--title" => options.title = Some(take_value(&args, &mut i)),
            "--brief" => options.brief = Some(take_value(&args, &mut i)),
            "--description" => options.description = Some(take_value(&args, &mut i)),
            "--limit" | "-n" => {
                let value = take_value(&args, &mut i);
                match value.parse() {
                    Ok(limit) => options.limit = Some(limit),
                    Err(_) => {
                        eprintln!("Error: --limit requires an integer, got {value:?}");
                        std::process::exit(1);
                    }
                }
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown argument: {other}");
                print_help();
                std::process::exit(1);
            }
            other => options.positional.push(other.to_string()),
        }
        i += 1;
    }

    options
}

fn take_value(args: &[String], i: &mut usize) -> String {
    if *i + 1 < args.len() {
        *i += 1;
        args[*i].clone()
    } else {
        eprintln!("Error: {} requires a value", args[*i]);
        std::process::exit(1);
    }
}

fn print_help() {
    println!(
        r#"hikelog - hiking trip journal

USAGE:
    hikelog [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
    new-trip <name>             Create a trip (--zone, --start, --end,
                                --title, --brief, --description)
    import <trip-id> <gpx>...   Import GPX recordings into a trip
    add-photos <trip-id> <f>... Ingest photo files into a trip
    process                     Derive pending web renditions (--limit N)
    rezone <trip-id> <zone>     Change a trip's zone and reinterpret its
                                photo timestamps in that zone
    delete-trip <trip-id>       Delete a trip and everything under it
    zones                       List recognized time zone names

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    HIKELOG_LOG         Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/hikelog/config.toml"#
    );
}

fn main() -> Result<()> {
    let options = parse_args();

    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match &options.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Database::open(&config.db_path)?;
    db.initialize()?;

    let Some(command) = options.positional.first() else {
        print_help();
        std::process::exit(1);
    };

    match command.as_str() {
        "new-trip" => new_trip(&db, &options),
        "import" => import(&db, &options),
        "add-photos" => add_photos(&db, &config, &options),
        "process" => process(&db, &config, &options),
        "rezone" => rezone(&db, &options),
        "delete-trip" => delete_trip(&db, &options),
        "zones" => {
            for zone in timestamp::known_zones() {
                println!("{zone}");
            }
            Ok(())
        }
        other => bail!("unknown command {other:?}"),
    }
}

fn new_trip(db: &Database, options: &CliOptions) -> Result<()> {
    let Some(name) = options.positional.get(1) else {
        bail!("new-trip requires a name");
    };
    let zone_hint = options.zone.as_deref();
    let start = options
        .start
        .as_deref()
        .map(|text| timestamp::to_instant(text, zone_hint))
        .transpose()?;
    let end = options
        .end
        .as_deref()
        .map(|text| timestamp::to_instant(text, zone_hint))
        .transpose()?;

    let trip = db.create_trip(&NewTrip {
        name: name.clone(),
        start,
        end,
        zone: options.zone.clone(),
        title: options.title.clone(),
        brief: options.brief.clone(),
        description: options.description.clone(),
    })?;
    println!("{}", serde_json::to_string_pretty(&trip)?);
    Ok(())
}

fn import(db: &Database, options: &CliOptions) -> Result<()> {
    let trip_id = parse_trip_id(options)?;
    let files = &options.positional[2..];
    if files.is_empty() {
        bail!("import requires at least one GPX file");
    }

    // Parse everything up front; one transaction covers the whole request.
    let mut elements = Vec::new();
    for file in files {
        let data = std::fs::read(file).with_context(|| format!("reading {file}"))?;
        elements.extend(gpx::parse(&data).with_context(|| format!("parsing {file}"))?);
    }

    let counts = importer::import_elements(db, trip_id, &elements)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": "OK",
            "items_added": counts,
        }))?
    );
    Ok(())
}

fn add_photos(db: &Database, config: &Config, options: &CliOptions) -> Result<()> {
    let trip_id = parse_trip_id(options)?;
    let files = &options.positional[2..];
    if files.is_empty() {
        bail!("add-photos requires at least one file");
    }

    let converter = ImageToolConverter::new(config.photos.convert_command.clone());
    let pipeline = PhotoPipeline::new(db, &converter);

    let mut created = Vec::new();
    for file in files {
        let data = std::fs::read(file).with_context(|| format!("reading {file}"))?;
        let name = PathBuf::from(file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.clone());
        created.push(pipeline.ingest(trip_id, &name, &data)?);
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": "OK",
            "created": created,
        }))?
    );
    Ok(())
}

fn process(db: &Database, config: &Config, options: &CliOptions) -> Result<()> {
    let limit = options.limit.unwrap_or(config.photos.process_limit);
    let converter = ImageToolConverter::new(config.photos.convert_command.clone());
    let pipeline = PhotoPipeline::new(db, &converter);
    let processed = pipeline.process_pending(limit)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "files_processed": processed,
        }))?
    );
    Ok(())
}

fn rezone(db: &Database, options: &CliOptions) -> Result<()> {
    let trip_id = parse_trip_id(options)?;
    let Some(zone) = options.positional.get(2) else {
        bail!("rezone requires a zone name");
    };

    // Retag photos first; it validates the zone name before anything is
    // written, so a bad name leaves the trip untouched.
    let changed = photos::rezone_trip_photos(db, trip_id, zone)?;
    db.update_trip(
        trip_id,
        &TripUpdate {
            zone: Some(zone.clone()),
            ..TripUpdate::default()
        },
    )?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": "OK",
            "photos_retagged": changed,
        }))?
    );
    Ok(())
}

fn delete_trip(db: &Database, options: &CliOptions) -> Result<()> {
    let trip_id = parse_trip_id(options)?;
    db.delete_trip(trip_id)?;
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({"status": "OK"}))?);
    Ok(())
}

fn parse_trip_id(options: &CliOptions) -> Result<i64> {
    let Some(raw) = options.positional.get(1) else {
        bail!("missing trip id");
    };
    raw.parse()
        .with_context(|| format!("invalid trip id {raw:?}"))
}
