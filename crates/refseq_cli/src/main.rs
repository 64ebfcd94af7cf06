//! `refseq` command-line entry point.
//!
//! # Responsibility
//! - Build configuration from flags, environment and `.env`.
//! - Drive the tracker host and reference inspection against one database.

mod config;

use anyhow::Context;
use clap::Parser;
use config::{CliArgs, Command, ProjectCommand, RunConfig};
use log::info;
use refseq_core::{
    init_logging, open_db_with, project_id_from_sequence_name, Connection, CreateItemRequest,
    EntityRef, ReferenceRepository, SqliteReferenceRepository, SqliteSequenceStore,
    TrackerService,
};

fn main() -> anyhow::Result<()> {
    // A missing `.env` file is fine.
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    let config = RunConfig::try_from(&args)?;
    init_logging(&config.logging).context("failed to initialize logging")?;

    let mut conn = open_db_with(&config.db, &config.core.store)
        .with_context(|| format!("failed to open database `{}`", config.db.display()))?;
    info!(
        "event=cli_start module=cli status=ok db={} version={}",
        config.db.display(),
        refseq_core::core_version()
    );

    match args.command {
        Command::Project(ProjectCommand::Create { name }) => {
            let mut tracker = tracker(&mut conn, &config)?;
            let project = tracker.create_project(&name)?;
            println!("project {} created: {}", project.id, project.name);
        }
        Command::Project(ProjectCommand::Delete { id }) => {
            tracker(&mut conn, &config)?.delete_project(id)?;
            println!("project {id} deleted");
        }
        Command::Item {
            project,
            kind,
            subject,
            import_ref,
        } => {
            let mut request = CreateItemRequest::new(kind, project, subject);
            request.imported_ref = import_ref;
            let item = tracker(&mut conn, &config)?.create_item(&request)?;
            println!(
                "{} #{} created in project {}",
                item.entity,
                item.reference.unwrap_or_default(),
                item.project_id
            );
        }
        Command::Items { project } => {
            for item in tracker(&mut conn, &config)?.list_items(project)? {
                let reference = item
                    .reference
                    .map(|value| format!("#{value}"))
                    .unwrap_or_else(|| "-".to_string());
                println!("{reference}\t{}\t{}", item.entity, item.subject);
            }
        }
        Command::References { project } => {
            let records = tracker(&mut conn, &config)?.references(project)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Resolve { project, reference } => {
            match tracker(&mut conn, &config)?.resolve(project, reference)? {
                Some(record) => println!("{record}"),
                None => anyhow::bail!("no reference #{reference} in project {project}"),
            }
        }
        Command::ReferenceOf { kind, id } => {
            let entity = EntityRef::new(kind, id);
            match tracker(&mut conn, &config)?.reference_of(entity)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("{entity} holds no reference"),
            }
        }
        Command::Sequences => {
            for sequence in SqliteSequenceStore::new(&conn).list_sequences()? {
                let project = project_id_from_sequence_name(&sequence.name)
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\tproject={}\tvalue={}", sequence.name, project, sequence.value);
            }
        }
        Command::FinishImport { project } => {
            let value = tracker(&mut conn, &config)?.finish_import(project)?;
            println!("project {project} sequence at {value}; next reference is {}", value + 1);
        }
        Command::PurgeReferences { project } => {
            let removed = SqliteReferenceRepository::new(&conn).delete_for_project(project)?;
            println!("removed {removed} reference record(s) of project {project}");
        }
    }

    Ok(())
}

fn tracker<'conn>(
    conn: &'conn mut Connection,
    config: &RunConfig,
) -> anyhow::Result<TrackerService<'conn>> {
    Ok(TrackerService::with_reference_hooks(
        conn,
        config.core.reference.clone(),
    )?)
}
