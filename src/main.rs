use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use itertools::Itertools;
use log::{info, trace};
use realmstore::rows::{Connection, MemoryConnection};
use realmstore::schema::metadata::EntityType;
use realmstore::schema::wire::binary;
use realmstore::{ConfigurationResolver, GraphLoader, model};

use crate::settings::{CliArgs, OperationMode};

mod settings;

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let args = CliArgs::parse();
    trace!("Starting with args: {:?}", args);

    let registry = Arc::new(model::game_model()?);
    let loader = GraphLoader::new(registry.clone(), ConfigurationResolver::new()).with_settings(args.loader_settings());

    match &args.operation_mode {
        OperationMode::Entities => {
            for entity in registry.entity_types() {
                println!("{}", describe(entity));
            }
        }
        OperationMode::Query { entity, by_id } => {
            let query = loader.query_for(entity)?;
            println!("{}", if *by_id { query.by_id_sql() } else { query.sql() });
        }
        OperationMode::Inspect { entity, file } => {
            let reader = File::open(file).with_context(|| format!("Opening {}", file.display()))?;
            let mut connection = MemoryConnection::from_json_lines(BufReader::new(reader))
                .map_err(|error| anyhow::anyhow!(error))
                .with_context(|| format!("Reading {}", file.display()))?;
            print_all(&loader, &mut connection, entity)?;
        }
        OperationMode::Binary { value } => {
            let bytes = binary::decode(value)?;
            println!("{} bytes: {}", bytes.len(), bytes.iter().map(|b| format!("{b:02x}")).join(" "));
        }
        #[cfg(feature = "postgres")]
        OperationMode::Load {
            database_url,
            entity,
            id,
        } => {
            let mut connection = realmstore::rows::PgConnection::connect(database_url)
                .map_err(|error| anyhow::anyhow!(error))
                .context("Connecting to the database")?;
            match id {
                Some(id) => match loader.load_by_id(&mut connection, entity, *id)? {
                    Some(object) => println!("{}", serde_json::to_string_pretty(&object.to_json())?),
                    None => println!("No {entity} with id {id}"),
                },
                None => print_all(&loader, &mut connection, entity)?,
            }
        }
    }

    Ok(())
}

fn print_all(loader: &GraphLoader, connection: &mut dyn Connection, entity: &str) -> Result<(), anyhow::Error> {
    let start = Instant::now();
    let mut count = 0;
    for object in loader.load_all(connection, entity)? {
        println!("{}", serde_json::to_string_pretty(&object?.to_json())?);
        count += 1;
    }
    info!("Printing {} aggregates took {}ms", count, start.elapsed().as_millis());
    Ok(())
}

fn describe(entity: &EntityType) -> String {
    let navigations = entity
        .navigations
        .iter()
        .map(|navigation| format!("{} -> {}", navigation.name, navigation.target))
        .join(", ");
    format!(
        "{} ({:?}, {}): {} columns, [{}]",
        entity.name,
        entity.lifetime,
        entity.table,
        entity.columns.len(),
        navigations
    )
}
