use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use legal_retrieval_core::{
    extract_text, AnalysisKind, AnalysisReport, BackendSettings, CharacterNgramEmbedder,
    ClovaClient, DocumentFilters, DocumentStore, EmbeddingService, EmbeddingSettings,
    HttpEmbedder, HttpRerankModel, InMemoryDocumentStore, InMemoryVectorIndex, IngestionOptions,
    LegalAssistant, LlmClients, LlmProvider, LlmSettings, Metadata, NewDocument, OpenAiClient,
    OpenSearchDocumentStore, QdrantIndex, RerankModel, RerankSettings, Reranker,
    RetrievalRequest, RetrievalSettings, Settings, VectorIndex,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "legal-retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenSearch base URL; documents stay in memory when unset.
    #[arg(long, env = "OPENSEARCH_URL")]
    opensearch_url: Option<String>,

    /// OpenSearch index name
    #[arg(long, env = "OPENSEARCH_INDEX", default_value = "legal_documents")]
    opensearch_index: String,

    /// Qdrant base URL; vectors stay in memory when unset.
    #[arg(long, env = "QDRANT_URL")]
    qdrant_url: Option<String>,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "legal_documents")]
    qdrant_collection: String,

    /// text-embeddings-inference server for document embeddings.
    #[arg(long, env = "EMBEDDING_ENDPOINT")]
    embedding_endpoint: Option<String>,

    /// Dimensions of the local fallback embedder.
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "768")]
    embedding_dimensions: usize,

    /// text-embeddings-inference server hosting the cross-encoder.
    #[arg(long, env = "RERANKER_ENDPOINT")]
    reranker_endpoint: Option<String>,

    #[arg(long, env = "RERANKER_MODEL", default_value = "BAAI/bge-reranker-v2-m3")]
    reranker_model: String,

    /// Texts per reranker request.
    #[arg(long, env = "RERANKER_BATCH_SIZE", default_value = "32")]
    reranker_batch_size: usize,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o")]
    openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    #[arg(long, env = "CLOVA_API_KEY", hide_env_values = true)]
    clova_api_key: Option<String>,

    #[arg(long, env = "CLOVA_APIGW_API_KEY", hide_env_values = true)]
    clova_apigw_api_key: Option<String>,

    /// Largest result count a request may ask for.
    #[arg(long, env = "MAX_SEARCH_RESULTS", default_value = "50")]
    max_results: usize,

    /// Seconds before a retrieval run is abandoned.
    #[arg(long, env = "RETRIEVAL_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Folder ingested before the command runs, for in-memory sessions.
    #[arg(long)]
    preload: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest .txt, .md and .pdf files into the document store and vector index.
    Ingest {
        /// Folder searched recursively.
        #[arg(long)]
        folder: PathBuf,
        #[command(flatten)]
        fields: DocumentFields,
    },
    /// Hybrid search with reranking.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Restrict to these document types.
        #[arg(long = "document-type")]
        document_types: Vec<String>,
        /// Restrict to these categories.
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Print the full document text instead of the preview.
        #[arg(long, default_value_t = false)]
        full: bool,
    },
    /// Analyse a file, a stored document, or the top hit of a query.
    Analyze {
        #[command(flatten)]
        target: AnalyzeTarget,
        /// Ignored by `--query`, which always runs the full analysis.
        #[arg(long, default_value = "full", conflicts_with = "query")]
        kind: AnalysisKind,
        #[arg(long, default_value = "openai")]
        provider: LlmProvider,
    },
    /// Answer a legal question using the best matching documents as context.
    Ask {
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "openai")]
        provider: LlmProvider,
    },
    /// Report backend and model availability.
    Status,
    /// Print a stored document.
    Get {
        #[arg(long)]
        id: String,
    },
    /// Add one document to the store and the vector index.
    Add {
        #[arg(long)]
        title: String,
        #[command(flatten)]
        body: DocumentBody,
        #[command(flatten)]
        fields: DocumentFields,
    },
    /// Delete a document from the store and the vector index.
    Remove {
        #[arg(long)]
        id: String,
    },
}

#[derive(Args)]
struct DocumentFields {
    #[arg(long, default_value = "document")]
    document_type: String,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    source: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
}

impl From<DocumentFields> for IngestionOptions {
    fn from(fields: DocumentFields) -> Self {
        IngestionOptions {
            document_type: fields.document_type,
            category: fields.category,
            source: fields.source,
            tags: fields.tags,
        }
    }
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct DocumentBody {
    /// Document text.
    #[arg(long)]
    content: Option<String>,
    /// Read the text from a .txt, .md or .pdf file.
    #[arg(long = "from-file")]
    from_file: Option<PathBuf>,
}

impl DocumentBody {
    fn text(self) -> anyhow::Result<String> {
        match (self.content, self.from_file) {
            (Some(content), _) => Ok(content),
            (None, Some(path)) => Ok(extract_text(&path)?),
            (None, None) => bail!("one of --content or --from-file is required"),
        }
    }
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct AnalyzeTarget {
    /// File to analyse.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Stored document id.
    #[arg(long)]
    id: Option<String>,
    /// Retrieve, then analyse the top result.
    #[arg(long)]
    query: Option<String>,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            retrieval: RetrievalSettings {
                max_limit: self.max_results,
                timeout_secs: self.timeout_secs,
                ..RetrievalSettings::default()
            },
            embedding: EmbeddingSettings {
                endpoint: self.embedding_endpoint.clone(),
                dimensions: self.embedding_dimensions,
                ..EmbeddingSettings::default()
            },
            rerank: RerankSettings {
                endpoint: self.reranker_endpoint.clone(),
                model: self.reranker_model.clone(),
                batch_size: self.reranker_batch_size,
            },
            llm: LlmSettings {
                openai_api_key: self.openai_api_key.clone(),
                openai_model: self.openai_model.clone(),
                openai_base_url: self.openai_base_url.clone(),
                clova_api_key: self.clova_api_key.clone(),
                clova_apigw_api_key: self.clova_apigw_api_key.clone(),
                ..LlmSettings::default()
            },
            backends: BackendSettings {
                opensearch_url: self.opensearch_url.clone(),
                opensearch_index: self.opensearch_index.clone(),
                qdrant_url: self.qdrant_url.clone(),
                qdrant_collection: self.qdrant_collection.clone(),
            },
        }
    }
}

async fn build_embedder(settings: &EmbeddingSettings) -> Arc<dyn EmbeddingService> {
    let local = |dimensions: usize| -> Arc<dyn EmbeddingService> {
        Arc::new(CharacterNgramEmbedder::new(dimensions))
    };

    match &settings.endpoint {
        Some(endpoint) => HttpEmbedder::connect(endpoint, settings.max_input_chars)
            .await
            .map(|embedder| Arc::new(embedder) as Arc<dyn EmbeddingService>)
            .or_else(|reason| {
                warn!(%reason, "embedding service unavailable, using character n-gram embedder");
                local(settings.dimensions)
            }),
        None => local(settings.dimensions),
    }
}

async fn build_reranker(settings: &RerankSettings) -> Reranker {
    match &settings.endpoint {
        Some(endpoint) => Reranker::new(
            HttpRerankModel::connect(endpoint, settings.model.clone())
                .await
                .map(|model| {
                    Arc::new(model.with_batch_size(settings.batch_size)) as Arc<dyn RerankModel>
                }),
        ),
        None => Reranker::disabled("no reranker endpoint configured"),
    }
}

async fn build_store(settings: &BackendSettings) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match &settings.opensearch_url {
        Some(url) => {
            let store = OpenSearchDocumentStore::new(url, &settings.opensearch_index);
            store
                .ensure_index()
                .await
                .context("preparing the open-search index")?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryDocumentStore::new())),
    }
}

async fn build_index(
    settings: &BackendSettings,
    dimensions: usize,
) -> anyhow::Result<Arc<dyn VectorIndex>> {
    match &settings.qdrant_url {
        Some(url) => {
            let index = QdrantIndex::new(url, &settings.qdrant_collection, dimensions);
            index
                .ensure_collection()
                .await
                .context("preparing the qdrant collection")?;
            Ok(Arc::new(index))
        }
        None => Ok(Arc::new(InMemoryVectorIndex::new(&settings.qdrant_collection))),
    }
}

fn print_analysis(report: &AnalysisReport) {
    println!("analysis: kind={} provider={}", report.kind, report.provider);
    if let Some(summary) = &report.summary {
        println!("summary:\n{summary}");
    }
    for (label, items) in [
        ("key point", &report.key_points),
        ("legal issue", &report.legal_issues),
        ("recommendation", &report.recommendations),
    ] {
        for (index, item) in items.iter().enumerate() {
            println!("{label} {}: {item}", index + 1);
        }
    }
    for (category, entities) in &report.entities {
        if !entities.is_empty() {
            println!("entities {category:?}: {}", entities.join(", "));
        }
    }
    if let Some(risk) = &report.risk {
        println!("risk: {:?}\n{}", risk.level, risk.text);
    }
    if let Some(error) = &report.error {
        println!("error: {error}");
    }
}

async fn analysis_input(
    assistant: &LegalAssistant,
    file: Option<PathBuf>,
    id: Option<String>,
) -> anyhow::Result<(String, Metadata)> {
    let mut metadata = Metadata::new();
    if let Some(path) = file {
        let content = extract_text(&path)?;
        metadata.insert("title".to_string(), path.display().to_string().into());
        return Ok((content, metadata));
    }
    if let Some(id) = id {
        let document = assistant
            .store()
            .get(&id)
            .await?
            .ok_or_else(|| anyhow!("document {id} not found"))?;
        metadata.insert("id".to_string(), document.id.into());
        metadata.insert("title".to_string(), document.title.into());
        return Ok((document.content, metadata));
    }
    bail!("one of --file, --id or --query is required")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = cli.settings();
    settings.validate()?;

    let embedder = build_embedder(&settings.embedding).await;
    let store = build_store(&settings.backends).await?;
    let index = build_index(&settings.backends, embedder.dimensions()).await?;
    let reranker = build_reranker(&settings.rerank).await;
    let llm = LlmClients::new(
        Arc::new(OpenAiClient::new(&settings.llm)?),
        Arc::new(ClovaClient::new(&settings.llm)?),
    );

    let assistant = LegalAssistant::new(
        store,
        embedder,
        index,
        reranker,
        llm,
        settings.retrieval.clone(),
    );
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "legal-retrieval boot"
    );

    if let Some(folder) = &cli.preload {
        let report = assistant
            .indexer()
            .ingest_folder(folder, &IngestionOptions::default())
            .await?;
        info!(folder = %folder.display(), documents = report.documents.len(), "preloaded");
    }

    match cli.command {
        Command::Ingest { folder, fields } => {
            let report = assistant
                .indexer()
                .ingest_folder(&folder, &fields.into())
                .await?;

            for skipped in &report.skipped_files {
                println!("skipped: {} ({})", skipped.path.display(), skipped.reason);
            }
            for document in &report.documents {
                println!("indexed: id={} title={}", document.id, document.title);
            }
            println!(
                "{} documents ingested at {}",
                report.documents.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Search {
            query,
            limit,
            document_types,
            categories,
            full,
        } => {
            let request = RetrievalRequest::new(query, limit).with_filters(DocumentFilters {
                document_types,
                categories,
            });
            let outcome = assistant.pipeline().run_with_timeout(request).await;

            if outcome.halted() {
                bail!(
                    "search failed: {}",
                    outcome.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            for failure in &outcome.failures {
                println!(
                    "degraded: stage={} kind={:?} {}",
                    failure.stage, failure.kind, failure.message
                );
            }

            println!("run_id: {}", outcome.run_id);
            for result in &outcome.results {
                println!(
                    "[{}] score={:.4} type={} id={} title={}",
                    result.rank,
                    result.relevance_score,
                    result.search_type,
                    result.id,
                    result.title
                );
                if !result.source.is_empty() {
                    println!("  source={}", result.source);
                }
                let text = if full {
                    &result.full_content
                } else {
                    &result.content_preview
                };
                println!("  {text}");
            }
            if outcome.results.is_empty() {
                println!("no matching documents");
            }
        }
        Command::Analyze {
            target,
            kind,
            provider,
        } => {
            if let Some(query) = target.query {
                let report = assistant.research(&query, provider).await;
                for message in &report.messages {
                    println!("{message}");
                }
                if let Some(analysis) = &report.analysis {
                    print_analysis(analysis);
                }
                if let Some(error) = report.error {
                    bail!("research stopped at {:?}: {error}", report.step);
                }
            } else {
                let (content, metadata) =
                    analysis_input(&assistant, target.file, target.id).await?;
                let report = assistant.analyze(&content, metadata, kind, provider).await;
                print_analysis(&report);
            }
        }
        Command::Ask { question, provider } => {
            let answer = assistant.answer_question(&question, provider).await?;
            println!("answer:\n{}", answer.answer);
            for result in &answer.related {
                println!("related: [{}] {} ({})", result.rank, result.title, result.id);
            }
            if let Some(error) = answer.retrieval_error {
                println!("retrieval degraded: {error}");
            }
        }
        Command::Status => {
            let status = assistant.system_status().await;
            match (&status.index, &status.index_error) {
                (Some(stats), _) => println!(
                    "vector index: backend={} collection={} documents={}",
                    stats.backend, stats.collection_name, stats.total_documents
                ),
                (None, Some(error)) => println!("vector index: unavailable ({error})"),
                (None, None) => println!("vector index: unknown"),
            }
            match (status.document_types, status.categories, &status.store_error) {
                (Some(types), Some(categories), _) => {
                    println!("document store: types={types} categories={categories}")
                }
                (_, _, Some(error)) => println!("document store: unavailable ({error})"),
                _ => println!("document store: unknown"),
            }
            println!(
                "embedder: {} ({} dimensions)",
                status.embedder, status.embedding_dimensions
            );
            match &status.reranker {
                Some(model) => println!("reranker: {model}"),
                None => println!("reranker: unavailable, fused order is kept"),
            }
            for model in &status.llm {
                println!(
                    "llm: provider={} model={} available={}",
                    model.provider, model.model, model.available
                );
            }
        }
        Command::Get { id } => {
            let document = assistant
                .store()
                .get(&id)
                .await?
                .ok_or_else(|| anyhow!("document {id} not found"))?;
            println!("id: {}", document.id);
            println!("title: {}", document.title);
            println!("type: {}", document.document_type);
            if let Some(category) = &document.category {
                println!("category: {category}");
            }
            if let Some(source) = &document.source {
                println!("source: {source}");
            }
            if !document.tags.is_empty() {
                println!("tags: {}", document.tags.join(", "));
            }
            println!("created: {}", document.date_created.to_rfc3339());
            println!("\n{}", document.content);
        }
        Command::Add {
            title,
            body,
            fields,
        } => {
            let options = IngestionOptions::from(fields);
            let document = NewDocument {
                title,
                content: body.text()?,
                document_type: options.document_type,
                category: options.category,
                source: options.source,
                tags: options.tags,
                ..NewDocument::default()
            };
            let created = assistant.indexer().index_documents(vec![document]).await?;
            for document in &created {
                println!("indexed: id={} title={}", document.id, document.title);
            }
        }
        Command::Remove { id } => {
            if assistant.indexer().remove(&id).await? {
                println!("removed {id}");
            } else {
                println!("document {id} not found");
            }
        }
    }

    Ok(())
}
