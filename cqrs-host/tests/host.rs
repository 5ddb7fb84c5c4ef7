use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::State,
    http::{Request, StatusCode},
    routing::get,
};
use cqrs_host::{
    CompositionContainer, Configuration, DefaultContainer, HostBuilder,
    HostContext, HostError, HttpClientFactory, HttpClientOptions,
};
use parking_lot::Mutex;
use tower::ServiceExt;

fn empty_router() -> Router<HostContext> {
    Router::new()
}

#[test]
fn phases_run_in_order_regardless_of_registration_order() -> Result<()> {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut builder = HostBuilder::new();

    let record = |name: &'static str| {
        let calls = Arc::clone(&calls);
        move || calls.lock().push(name)
    };

    let container = record("container");
    builder.configure_container::<DefaultContainer, _>(move |_| container());
    let services = record("services");
    builder.configure_services(move |_, _| services());
    let app = record("app");
    builder.configure_app_configuration(move |_, _| app());
    let host = record("host");
    builder.configure_host_configuration(move |_| host());
    let second_services = record("services again");
    builder.configure_services(move |_, _| second_services());

    builder.build(empty_router())?;

    assert_eq!(*calls.lock(), vec![
        "host",
        "app",
        "services",
        "services again",
        "container"
    ]);
    Ok(())
}

#[test]
fn app_configuration_is_layered_over_host_configuration() -> Result<()> {
    let mut builder = HostBuilder::new();
    builder
        .configure_host_configuration(|config| {
            config.add_in_memory([("Shared", "host"), ("HostOnly", "yes")]);
        })
        .configure_app_configuration(|context, config| {
            assert_eq!(context.configuration.get("HostOnly"), Some("yes"));
            config.add_in_memory([("Shared", "app")]);
        })
        .configure_services(|context, _| {
            assert_eq!(context.configuration.get("Shared"), Some("app"));
        });

    let host = builder.build(empty_router())?;
    let configuration = host.services().get::<Configuration>()?;
    assert_eq!(configuration.get("Shared"), Some("app"));
    assert_eq!(configuration.get("HostOnly"), Some("yes"));
    assert_eq!(host.configuration().get("Shared"), Some("app"));
    Ok(())
}

#[test]
fn environment_comes_from_host_configuration() -> Result<()> {
    let mut builder = HostBuilder::new();
    assert_eq!(builder.build(empty_router())?.environment(), "Production");

    builder = HostBuilder::new();
    builder
        .use_environment("Staging")
        .configure_host_configuration(|config| {
            config.add_in_memory([("Environment", "Development")]);
        })
        .configure_services(|context, _| assert!(context.is_development()));
    assert_eq!(builder.build(empty_router())?.environment(), "Development");
    Ok(())
}

#[test]
fn configuring_the_wrong_container_type_fails_the_build() {
    let mut builder = HostBuilder::new();
    builder.configure_container::<CompositionContainer, _>(|_| {});

    let err = builder.build(empty_router()).unwrap_err();
    assert!(matches!(
        err,
        HostError::ContainerTypeMismatch { expected, actual }
            if expected.ends_with("CompositionContainer")
                && actual.ends_with("DefaultContainer")
    ));
}

#[test]
fn container_actions_reach_the_swapped_backend() -> Result<()> {
    let mut builder = HostBuilder::new();
    builder
        .configure_container::<CompositionContainer, _>(|container| {
            container.register_instance::<String>(Arc::new("container".into()));
            container.register_instance::<u32>(Arc::new(7));
        })
        .use_container(CompositionContainer::new())
        .configure_services(|_, services| {
            services.add_singleton::<String>(Arc::new("services".into()));
        });

    let host = builder.build(empty_router())?;
    assert_eq!(host.services().get::<String>()?.as_str(), "services");
    assert_eq!(*host.services().get::<u32>()?, 7);
    Ok(())
}

#[test]
fn declared_http_clients_are_served_by_the_default_factory() -> Result<()> {
    let mut builder = HostBuilder::new();
    builder.configure_services(|_, services| {
        services.add_http_client(
            "posts",
            HttpClientOptions::new().base_url("https://posts.example.test/"),
        );
    });

    let host = builder.build(empty_router())?;
    let factory = host.services().get::<dyn HttpClientFactory>()?;
    let client = factory.create_client("posts");
    assert_eq!(
        client.resolve_url("posts/1")?.as_str(),
        "https://posts.example.test/posts/1"
    );
    Ok(())
}

#[test]
fn invalid_client_address_fails_the_build() {
    let mut builder = HostBuilder::new();
    builder.configure_services(|_, services| {
        services.add_http_client("broken", HttpClientOptions::new().base_url("::"));
    });
    assert!(matches!(
        builder.build(empty_router()),
        Err(HostError::Http(_))
    ));
}

#[tokio::test]
async fn router_handlers_see_host_context() -> Result<()> {
    async fn greeting(State(context): State<HostContext>) -> String {
        context
            .configuration()
            .get("Greeting")
            .unwrap_or("none")
            .to_string()
    }

    let mut builder = HostBuilder::new();
    builder.configure_app_configuration(|_, config| {
        config.add_in_memory([("Greeting", "hello")]);
    });
    let host = builder.build(Router::new().route("/greeting", get(greeting)))?;

    let response = host
        .router()
        .oneshot(Request::get("/greeting").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"hello");
    Ok(())
}
