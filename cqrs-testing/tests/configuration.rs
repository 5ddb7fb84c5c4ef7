use std::sync::Arc;

use anyhow::Result;
use cqrs_host::{CompositionContainer, DefaultContainer, HostError};
use cqrs_testing::{TEST_ENVIRONMENT, TestApplication, TestingError};
use cqrs_testing_example::App;

#[derive(Debug, Default)]
struct Foo;

#[test]
fn reads_application_defaults() -> Result<()> {
    let app = TestApplication::<App>::new();
    let configuration = app.configuration()?;

    assert_eq!(configuration.get("SomeConfigKey"), Some("SomeConfigValue"));
    assert_eq!(
        configuration.get("AnotherConfigKey"),
        Some("AnotherConfigValue")
    );
    Ok(())
}

#[test]
fn overrides_win_over_application_defaults() -> Result<()> {
    let app = TestApplication::<App>::new();
    app.with_configuration("SomeConfigKey", "SomeOverriddenConfigValue")?
        .with_configuration("AnotherConfigKey", "AnotherOverriddenConfigValue")?
        .with_configuration("Brand:New", "value")?;

    let configuration = app.configuration()?;
    assert_eq!(
        configuration.get("SomeConfigKey"),
        Some("SomeOverriddenConfigValue")
    );
    assert_eq!(
        configuration.get("AnotherConfigKey"),
        Some("AnotherOverriddenConfigValue")
    );
    assert_eq!(configuration.get("brand:new"), Some("value"));
    Ok(())
}

#[test]
fn most_recent_override_of_a_key_wins() -> Result<()> {
    let app = TestApplication::<App>::new();
    app.with_configuration("SomeConfigKey", "first")?
        .with_configuration("SomeConfigKey", "second")?;

    assert_eq!(app.configuration()?.get("SomeConfigKey"), Some("second"));
    Ok(())
}

#[test]
fn host_is_built_in_the_test_environment() -> Result<()> {
    let app = TestApplication::<App>::new();
    assert_eq!(app.host()?.environment(), TEST_ENVIRONMENT);

    let app = TestApplication::<App>::new();
    app.with_configuration("Environment", "Staging")?;
    assert_eq!(app.host()?.environment(), "Staging");
    Ok(())
}

#[test]
fn configure_services_registrations_are_resolvable() -> Result<()> {
    let app = TestApplication::<App>::new();
    app.configure_services(|_, services| {
        services.add_singleton(Arc::new(Foo));
    })?;

    assert!(app.services()?.is_registered::<Foo>());
    app.service::<Foo>()?;
    Ok(())
}

#[test]
fn configure_container_reaches_the_composition_container() -> Result<()> {
    let app = TestApplication::<App>::new();
    app.configure_container::<CompositionContainer, _>(|container| {
        assert!(container.composition_roots()[0].ends_with("AppCompositionRoot"));
        container.register::<Foo>();
    })?;

    app.service::<Foo>()?;
    Ok(())
}

#[test]
fn configure_container_with_the_wrong_type_fails_the_build() {
    let app = TestApplication::<App>::new();
    app.configure_container::<DefaultContainer, _>(|_| {})
        .unwrap();

    let err = app.create_client().unwrap_err();
    assert!(matches!(
        err,
        TestingError::Host(HostError::ContainerTypeMismatch { .. })
    ));
}

#[test]
fn configuration_after_build_is_rejected() -> Result<()> {
    let app = TestApplication::<App>::new();
    app.create_client()?;
    assert!(app.is_built());

    assert!(matches!(
        app.with_configuration("SomeConfigKey", "late"),
        Err(TestingError::HostAlreadyBuilt)
    ));
    assert!(matches!(
        app.mock_command_handler::<String>(),
        Err(TestingError::HostAlreadyBuilt)
    ));
    assert!(matches!(
        app.mock_http_client("posts"),
        Err(TestingError::HostAlreadyBuilt)
    ));
    assert_eq!(
        app.configuration()?.get("SomeConfigKey"),
        Some("SomeConfigValue")
    );
    Ok(())
}

#[test]
fn failing_queued_action_aborts_the_build() {
    let app = TestApplication::<App>::new();
    app.with_configuration("SomeConfigKey", "queued first")
        .unwrap()
        .configure_host_builder(|_| {
            Err(HostError::Composition("refusing to build".into()))
        })
        .unwrap();

    let err = app.create_client().unwrap_err();
    assert!(matches!(err, TestingError::Host(HostError::Composition(_))));
    assert!(!app.is_built());

    let err = app.configuration().unwrap_err();
    assert!(matches!(
        err,
        TestingError::HostBuildFailed(ref reason) if reason == "refusing to build"
    ));
}

#[test]
fn raw_host_builder_access() -> Result<()> {
    let app = TestApplication::<App>::new();
    app.configure_host_builder(|builder| {
        builder.configure_app_configuration(|context, config| {
            config.add_in_memory([("SeenEnvironment", context.environment.clone())]);
        });
        Ok(())
    })?;

    assert_eq!(
        app.configuration()?.get("SeenEnvironment"),
        Some(TEST_ENVIRONMENT)
    );
    Ok(())
}
