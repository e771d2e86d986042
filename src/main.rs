use std::{path::Path, process, sync::Arc};

use echoes::{
    application::{
        access::Caller,
        echoes::{EchoStore, EventPublishHook},
        error::AppError,
        generator::{DisabledGenerator, TextGenerator},
        pagination::EchoQuery,
        recommend::{RecommendSettings, RecommendationEngine},
        repos::{EchoReadRepo, EchoUnitOfWork},
        service::EchoService,
        summary::{SummaryCoalescer, SummarySettings},
    },
    cache::{CacheConfig, EchoCache},
    config::{self, CliArgs, Command, EchoCommand, Settings, TagsCommand},
    infra::{
        access::StaticAccessPolicy,
        db::PostgresRepositories,
        error::InfraError,
        events::EventBus,
        generator::OpenAiCompatibleGenerator,
        memory::InMemoryRepositories,
        telemetry,
    },
};
use echoes_api_types::{EchoPayload, RecommendLayoutRequest};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        telemetry::report_error("echoes", &error);
        process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let (cli, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    if let Command::Migrate = cli.command {
        return run_migrate(&settings).await;
    }

    let repositories = init_repositories(&settings).await?;
    let service = build_service(&settings, repositories)?;
    let caller = caller(&cli, &settings);

    match cli.command {
        Command::Migrate => Ok(()),
        Command::Recommend(args) => {
            let request: RecommendLayoutRequest = read_json(&args.input).await?;
            print_json(&service.recommend_layout(&request).await)
        }
        Command::Summary => {
            println!("{}", service.get_recent_summary().await?);
            Ok(())
        }
        Command::Echo(command) => run_echo(&service, &caller, command).await,
        Command::Tags(command) => run_tags(&service, &caller, command).await,
    }
}

async fn run_echo(
    service: &EchoService,
    caller: &Caller,
    command: EchoCommand,
) -> Result<(), AppError> {
    match command {
        EchoCommand::Get { id } => print_json(&service.get_echo_by_id(caller, id).await?),
        EchoCommand::List(args) => {
            let query = EchoQuery::new(args.page, args.page_size, args.search.as_deref());
            let page = match args.tag_id {
                Some(tag_id) => service.get_echos_by_tag(caller, tag_id, &query).await?,
                None => service.get_echos_by_page(caller, &query).await?,
            };
            print_json(&page)
        }
        EchoCommand::Today => print_json(&service.get_today_echos(caller).await?),
        EchoCommand::Create(args) => {
            let payload: EchoPayload = read_json(&args.input).await?;
            print_json(&service.create_echo(caller, payload).await?)
        }
        EchoCommand::Like { id } => {
            service.like_echo(id).await?;
            print_json(&json!({ "id": id, "status": "liked" }))
        }
        EchoCommand::Delete { id } => {
            service.delete_echo(caller, id).await?;
            print_json(&json!({ "id": id, "status": "deleted" }))
        }
    }
}

async fn run_tags(
    service: &EchoService,
    caller: &Caller,
    command: TagsCommand,
) -> Result<(), AppError> {
    match command {
        TagsCommand::List => print_json(&service.get_all_tags().await?),
        TagsCommand::Create { name } => print_json(&service.create_tag(caller, &name).await?),
        TagsCommand::Delete { id } => {
            service.delete_tag(caller, id).await?;
            print_json(&json!({ "id": id, "status": "deleted" }))
        }
    }
}

async fn run_migrate(settings: &Settings) -> Result<(), AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| AppError::validation("database.url is required for migrations"))?;
    let pool = PostgresRepositories::connect(url, settings.database.max_connections)
        .await
        .map_err(InfraError::from)?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    info!("Migrations applied");
    Ok(())
}

struct Repositories {
    reader: Arc<dyn EchoReadRepo>,
    uow: Arc<dyn EchoUnitOfWork>,
}

async fn init_repositories(settings: &Settings) -> Result<Repositories, AppError> {
    match settings.database.url.as_deref() {
        Some(url) => {
            let pool = PostgresRepositories::connect(url, settings.database.max_connections)
                .await
                .map_err(InfraError::from)?;
            let repositories = Arc::new(PostgresRepositories::new(pool));
            repositories
                .health_check()
                .await
                .map_err(InfraError::from)?;
            Ok(Repositories {
                reader: repositories.clone(),
                uow: repositories,
            })
        }
        None => {
            warn!("No database configured; using in-memory storage for this run");
            let repositories = Arc::new(InMemoryRepositories::new());
            Ok(Repositories {
                reader: repositories.clone(),
                uow: repositories,
            })
        }
    }
}

fn build_service(settings: &Settings, repositories: Repositories) -> Result<EchoService, AppError> {
    let cache = Arc::new(EchoCache::new(&CacheConfig::from(&settings.cache)));
    let events = Arc::new(EventBus::default());
    let store = EchoStore::new(
        repositories.reader,
        repositories.uow,
        cache,
        settings.site.timezone,
    )
    .with_hook(Arc::new(EventPublishHook::new(events)));

    let generator: Arc<dyn TextGenerator> =
        match OpenAiCompatibleGenerator::from_settings(&settings.generator)? {
            Some(generator) => Arc::new(generator),
            None => Arc::new(DisabledGenerator),
        };

    let recommender = RecommendationEngine::new(
        generator.clone(),
        RecommendSettings {
            temperature: settings.generator.layout_temperature,
            timeout: settings.generator.timeout,
        },
    );
    let summaries = SummaryCoalescer::new(
        store.clone(),
        generator,
        SummarySettings {
            temperature: settings.generator.recent_temperature,
            timeout: settings.generator.timeout,
        },
    );
    let policy = Arc::new(StaticAccessPolicy::owner_only(settings.site.owner_id));

    Ok(EchoService::new(store, policy, recommender, summaries))
}

fn caller(cli: &CliArgs, settings: &Settings) -> Caller {
    if cli.anonymous {
        Caller::Anonymous
    } else {
        Caller::user(settings.site.owner_id, settings.site.owner_username.clone())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let raw = if path == Path::new("-") {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .map_err(InfraError::from)?;
        buffer
    } else {
        tokio::fs::read_to_string(path)
            .await
            .map_err(InfraError::from)?
    };
    serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("invalid JSON input: {err}")))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
