//! Demo application: temperature commands and queries plus a few routes that
//! proxy an upstream comments API through named HTTP clients.

pub mod clients;
pub mod temperature;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use cqrs_host::{
    ApiResult, CommandHandler, CompositionContainer, CompositionRoot,
    ConfigurationBuilder, EntryPoint, HostBuilder, HostBuilderContext,
    HostContext, HostError, HttpClientFactory, HttpClientOptions, QueryHandler,
    ServiceCollection,
};
use tracing::debug;

use clients::{CommentsClient, POSTS_CLIENT, ValueClient};
use temperature::{
    FixedTemperatureSource, TemperatureCommand, TemperatureCommandHandler,
    TemperatureQuery, TemperatureQueryHandler, TemperatureQueryResult,
    TemperatureSource,
};

const DEFAULTS: &str = include_str!("../config/defaults.toml");

/// Prefix of environment variables read into the app configuration, e.g.
/// `CQRS_Comments__BaseUrl`.
pub const ENV_PREFIX: &str = "CQRS_";

/// Registers the command and query handlers with the container.
#[derive(Debug, Default)]
pub struct AppCompositionRoot;

impl CompositionRoot for AppCompositionRoot {
    fn compose(&self, container: &mut CompositionContainer) {
        container
            .register_instance::<dyn TemperatureSource>(Arc::new(
                FixedTemperatureSource::default(),
            ))
            .register_singleton::<dyn CommandHandler<TemperatureCommand>, _>(
                |services| {
                    let logger = services.logger::<TemperatureCommand>()?;
                    Ok(Arc::new(TemperatureCommandHandler::new(logger)))
                },
            )
            .register_singleton::<dyn QueryHandler<TemperatureQuery>, _>(
                |services| {
                    let source = services.get::<dyn TemperatureSource>()?;
                    Ok(Arc::new(TemperatureQueryHandler::new(source)))
                },
            );
    }
}

/// Entry point of the demo application.
#[derive(Debug)]
pub struct App;

impl EntryPoint for App {
    fn configure(builder: &mut HostBuilder) -> Result<(), HostError> {
        let mut container = CompositionContainer::new();
        container.register_from(&AppCompositionRoot);

        builder
            .use_container(container)
            .configure_app_configuration(|_, config| add_app_sources(config))
            .configure_services(register_http_clients);
        Ok(())
    }

    fn router() -> Router<HostContext> {
        Router::new()
            .route("/temperatures/{city}", get(get_temperature))
            .route("/temperatures", post(post_temperature))
            .route("/comments", get(get_comments))
            .route("/comments/{id}", get(get_comment))
            .route("/posts/{id}", get(get_post))
            .route("/value", get(get_value))
    }
}

fn add_app_sources(config: &mut ConfigurationBuilder) {
    config
        .add_toml_str("defaults.toml", DEFAULTS)
        .add_env_file(".env", true)
        .add_environment_variables(Some(ENV_PREFIX));
}

fn register_http_clients(context: &HostBuilderContext, services: &mut ServiceCollection) {
    let options_for = |section: &str| {
        let options = HttpClientOptions::new();
        match context.configuration.get(&format!("{section}:BaseUrl")) {
            Some(base_url) => {
                debug!(section, base_url, "declaring http client");
                options.base_url(base_url)
            }
            None => {
                debug!(section, "http client declared without a base url");
                options
            }
        }
    };

    services
        .add_typed_client::<CommentsClient>(options_for("Comments"))
        .add_typed_client::<ValueClient>(options_for("Values"))
        .add_http_client(POSTS_CLIENT, options_for("Posts"));
}

async fn get_temperature(
    State(context): State<HostContext>,
    Path(city): Path<String>,
) -> ApiResult<Json<TemperatureQueryResult>> {
    let result = context.queries().execute(TemperatureQuery { city }).await?;
    Ok(Json(result))
}

async fn post_temperature(
    State(context): State<HostContext>,
    Json(command): Json<TemperatureCommand>,
) -> ApiResult<StatusCode> {
    context.commands().execute(command).await?;
    Ok(StatusCode::OK)
}

async fn get_comments(State(context): State<HostContext>) -> ApiResult<String> {
    let client = context.services().get::<CommentsClient>()?;
    Ok(client.get_comments().await?)
}

async fn get_comment(
    State(context): State<HostContext>,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let client = context.services().get::<CommentsClient>()?;
    Ok(client.get_comment(&id).await?)
}

async fn get_post(
    State(context): State<HostContext>,
    Path(id): Path<u32>,
) -> ApiResult<String> {
    let factory = context.services().get::<dyn HttpClientFactory>()?;
    let client = factory.create_client(POSTS_CLIENT);
    Ok(client.get_string(&format!("posts/{id}")).await?)
}

async fn get_value(State(context): State<HostContext>) -> ApiResult<Json<i64>> {
    let client = context.services().get::<ValueClient>()?;
    Ok(Json(client.get_value().await?))
}
