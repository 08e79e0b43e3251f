//! Pipeline task entry point
//!
//! Reads the task inputs from the agent environment, resolves the binary and
//! symbols, runs the distribution and reports the task result.

use appcenter_distribute::error::{Error, Result};
use appcenter_distribute::inputs::DistributeInputs;
use appcenter_distribute::paths::PathResolver;
use appcenter_distribute::pipeline::{AgentLayer, ProcessEnv, TaskResult, VariableSource, complete_command};
use appcenter_distribute::symbols::prepare_symbols;
use appcenter_distribute::{
    ApiClient, Config, DistributionPlan, DistributionReport, Event, ReleaseCoordinator,
    SymbolsUpload,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> ExitCode {
    let source = ProcessEnv;
    init_tracing(&source);

    match run(&source).await {
        Ok(report) => {
            let message = format!("Release {} published", report.release_id);
            info!("{message}");
            println!("{}", complete_command(TaskResult::Succeeded, &message));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            println!("{}", complete_command(TaskResult::Failed, &e.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Agent logging commands on stdout, filtered by `RUST_LOG` or `System.Debug`
fn init_tracing(source: &dyn VariableSource) {
    let debug_enabled = source
        .variable("System.Debug")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let default_filter = if debug_enabled {
        "info,appcenter_distribute=debug"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(AgentLayer::stdout())
        .init();
}

async fn run(source: &dyn VariableSource) -> Result<DistributionReport> {
    let inputs = DistributeInputs::from_source(source)?;
    let config = match &inputs.config_file {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };

    let working_dir = std::env::current_dir()?;
    let app_file = PathResolver::new(&working_dir)
        .resolve_single(&inputs.app_pattern)?
        .ok_or_else(|| Error::config("binary file not found", "app"))?;
    debug!(app = %app_file.display(), "resolved binary");

    let symbols = prepare_all_symbols(&inputs, &working_dir, &archive_dir(source)).await?;

    let api = ApiClient::new(inputs.endpoint.clone(), inputs.user_agent.clone(), &config.http)?;
    let coordinator = ReleaseCoordinator::new(api, config, inputs.app_slug.clone());

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested");
            token.cancel();
        }
    });

    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::UploadProgress { percent } => debug!("upload progress: {percent:.0}%"),
                Event::StateChanged { to, .. } => debug!(state = %to, "release state changed"),
                _ => {}
            }
        }
    });

    let plan = DistributionPlan {
        app_file,
        build_version: inputs.build_version.clone(),
        publish: inputs.publish_request(),
        request_source: inputs.request_source,
        symbols,
    };
    coordinator.distribute(&plan).await
}

/// Resolve and archive every symbols input before the release upload begins
async fn prepare_all_symbols(
    inputs: &DistributeInputs,
    working_dir: &Path,
    archive_dir: &Path,
) -> Result<Vec<SymbolsUpload>> {
    let resolver = PathResolver::new(working_dir)
        .continue_on_error(inputs.continue_if_symbols_not_found)
        .pack_parent_folder(inputs.pack_parent_folder);

    let mut uploads = Vec::new();
    for lookup in &inputs.symbols {
        let Some(pattern) = lookup.pattern.as_deref() else {
            continue;
        };
        let paths = resolver.expand_symbols_paths(lookup.symbol_type, pattern)?;
        if let Some(file) = prepare_symbols(&paths, lookup.force_archive, archive_dir).await? {
            debug!(input = lookup.input, file = %file.display(), "symbols prepared");
            uploads.push(SymbolsUpload {
                symbol_type: lookup.symbol_type,
                file,
            });
        }
    }
    Ok(uploads)
}

fn archive_dir(source: &dyn VariableSource) -> PathBuf {
    source
        .variable("Build.ArtifactStagingDirectory")
        .or_else(|| source.variable("Agent.TempDirectory"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}
