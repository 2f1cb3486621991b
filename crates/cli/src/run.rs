//! Wires config, backend, tools and telemetry into one headless run.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use clawrun_agent::{
    AgentLoop, AtCommandProcessor, OutputSink, SinkErrorChannel, renderer_for,
};
use clawrun_config::AppConfig;
use clawrun_core::{Error, ResumedSessionState};
use clawrun_providers::OpenAiCompatBackend;
use clawrun_telemetry::{TelemetryEngine, TelemetryExporter};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Cli;

/// Run the CLI and return the process exit code.
pub async fn execute(cli: Cli) -> i32 {
    let mut config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    if let Some(format) = cli.output_format {
        config.output_format = format;
    }
    if let Some(turns) = cli.max_session_turns {
        config.max_session_turns = turns;
    }
    if let Some(model) = cli.model {
        config.backend.model = model;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        return 1;
    }
    debug!(
        output_format = %config.output_format,
        max_session_turns = config.max_session_turns,
        model = %config.backend.model,
        "Configuration loaded"
    );

    let stdout = Arc::new(OutputSink::stdout());
    let stderr = Arc::new(OutputSink::stderr());
    let renderer = renderer_for(config.output_format, stdout, stderr.clone());

    let input = match read_prompt(cli.prompt).await {
        Ok(input) => input,
        Err(e) => {
            renderer.on_error(&e);
            return e.exit_code();
        }
    };

    let resumed = match cli.resume.as_deref().map(load_session).transpose() {
        Ok(resumed) => resumed,
        Err(e) => {
            renderer.on_error(&e);
            return e.exit_code();
        }
    };

    let telemetry = Arc::new(build_telemetry(&config));
    let workspace_root = config.workspace_root();
    let registry = clawrun_tools::default_registry(&workspace_root, &config.tools.allowed_commands);

    let backend = match OpenAiCompatBackend::from_config(&config.backend) {
        Ok(backend) => backend
            .with_tools(registry.definitions())
            .with_telemetry(telemetry.clone()),
        Err(e) => {
            let e = Error::from(e);
            renderer.on_error(&e);
            return e.exit_code();
        }
    };
    info!(backend = %backend.model(), "Backend ready");

    let agent = AgentLoop::new(
        Arc::new(backend),
        Arc::new(registry),
        Arc::new(SinkErrorChannel::new(stderr)),
        renderer,
        telemetry,
    )
    .with_max_turns(config.max_session_turns)
    .with_preprocessor(Arc::new(AtCommandProcessor::new(workspace_root)));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let prompt_id = uuid::Uuid::new_v4().to_string();
    match agent.run(&input, &prompt_id, resumed, cancel).await {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig, clawrun_config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_with_env(path)?,
        None => AppConfig::load()?,
    };
    config.debug |= cli.debug;
    Ok(config)
}

/// The prompt from `--prompt`, else all of stdin. Blank input is an error
/// whichever source it came from.
async fn read_prompt(prompt: Option<String>) -> Result<String, Error> {
    let input = match prompt {
        Some(prompt) => prompt,
        None if std::io::stdin().is_terminal() => {
            return Err(Error::Input(
                "No input provided. Pass --prompt or pipe a prompt on stdin.".into(),
            ));
        }
        None => {
            let mut input = String::new();
            tokio::io::stdin().read_to_string(&mut input).await?;
            input
        }
    };

    let input = input.trim();
    if input.is_empty() {
        return Err(Error::Input("No input provided.".into()));
    }
    Ok(input.to_string())
}

fn load_session(path: &Path) -> Result<ResumedSessionState, Error> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("cannot read session file {}: {e}", path.display()),
    })?;
    serde_json::from_str(&content).map_err(|e| Error::Config {
        message: format!("invalid session file {}: {e}", path.display()),
    })
}

fn build_telemetry(config: &AppConfig) -> TelemetryEngine {
    if !config.telemetry.enabled {
        return TelemetryEngine::disabled();
    }
    let engine = TelemetryEngine::new();
    match &config.telemetry.outfile {
        Some(path) => match TelemetryExporter::open(path) {
            Ok(exporter) => engine.with_exporter(exporter),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot open telemetry outfile");
                engine
            }
        },
        None => engine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_prompt_is_input_error() {
        for prompt in ["", "   ", "\n\t"] {
            let err = read_prompt(Some(prompt.to_string())).await.unwrap_err();
            assert!(matches!(err, Error::Input(_)), "prompt {prompt:?}");
            assert_eq!(err.exit_code(), 42);
        }
    }

    #[tokio::test]
    async fn prompt_flag_is_trimmed() {
        let prompt = read_prompt(Some("  what is 2+2?\n".into())).await.unwrap();
        assert_eq!(prompt, "what is 2+2?");
    }

    #[test]
    fn session_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"messages":[{"type":"user","content":"hi"}]}"#).unwrap();

        let state = load_session(&path).unwrap();
        assert_eq!(state.messages.len(), 1);
        assert!(matches!(load_session(&dir.path().join("missing.json")), Err(Error::Config { .. })));
    }
}
