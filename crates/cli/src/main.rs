use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use piqi_kernel::{Engine, EngineConfig, Header};
use piqi_terminology::{HttpFhirClient, HttpKnowledgeClient, MockFhirClient, MockKnowledgeClient};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct Args {
    reference_data: PathBuf,
    message: PathBuf,
    rubric: Option<String>,
    cancel_after_ms: Option<u64>,
    data_provider_id: String,
    data_source_id: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut reference_data = None;
    let mut message = None;
    let mut rubric = None;
    let mut cancel_after_ms = None;
    let mut data_provider_id = "unknown".to_string();
    let mut data_source_id = "unknown".to_string();

    let mut it = std::env::args().skip(1);
    while let Some(flag) = it.next() {
        let mut value = || it.next().ok_or_else(|| anyhow::anyhow!("{flag} requires a value"));
        match flag.as_str() {
            "--reference-data" => reference_data = Some(PathBuf::from(value()?)),
            "--message" => message = Some(PathBuf::from(value()?)),
            "--rubric" => rubric = Some(value()?),
            "--cancel-after-ms" => cancel_after_ms = Some(value()?.parse()?),
            "--data-provider-id" => data_provider_id = value()?,
            "--data-source-id" => data_source_id = value()?,
            other => return Err(anyhow::anyhow!("unrecognized flag {other}")),
        }
    }

    Ok(Args {
        reference_data: reference_data.ok_or_else(|| anyhow::anyhow!("--reference-data is required"))?,
        message: message.ok_or_else(|| anyhow::anyhow!("--message is required"))?,
        rubric,
        cancel_after_ms,
        data_provider_id,
        data_source_id,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true))
            .init();
    }

    let args = parse_args()?;
    let reference_data_json = std::fs::read_to_string(&args.reference_data)?;
    let message_json = std::fs::read_to_string(&args.message)?;

    let config = EngineConfig::from_env();

    let fhir: Arc<dyn piqi_terminology::FhirClient> = match HttpFhirClient::from_env() {
        Some(client) => Arc::new(client),
        None => {
            tracing::info!("FHIR_BASE_URL unset, using mock FHIR client");
            Arc::new(MockFhirClient::new())
        }
    };
    let knowledge: Arc<dyn piqi_terminology::KnowledgeClient> = match HttpKnowledgeClient::from_env() {
        Some(client) => Arc::new(client),
        None => {
            tracing::info!("KNOWLEDGE_BASE_URL unset, using mock knowledge client");
            Arc::new(MockKnowledgeClient::new())
        }
    };

    let registry = piqi_kernel::sam::SamRegistry::with_collaborators(fhir, knowledge, config.collaborator_timeout);
    let engine = Engine::new(&reference_data_json, args.rubric.as_deref(), registry)?;

    let cancel = CancellationToken::new();
    if let Some(ms) = args.cancel_after_ms {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            cancel.cancel();
        });
    }

    let header = Header {
        data_provider_id: args.data_provider_id,
        data_source_id: args.data_source_id,
        message_id: args
            .message
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        process_date: chrono::Utc::now().to_rfc3339(),
    };

    let scorecard = engine.evaluate(&message_json, header, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&scorecard)?);
    Ok(())
}
