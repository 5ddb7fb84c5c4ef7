use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use cqrs_host::{CommandHandler, LogLevel, Logger};
use cqrs_testing::{MockCommandHandler, TestApplication, Times};
use cqrs_testing_example::{
    App,
    temperature::{
        TemperatureCommand, TemperatureCommandHandler, TemperatureQuery,
        TemperatureQueryResult, TemperatureSource,
    },
};
use mockall::mock;
use serde_json::Value;

mock! {
    Source {}

    impl TemperatureSource for Source {
        fn current(&self, city: &str) -> f64;
    }
}

fn oslo(value: f64) -> TemperatureCommand {
    TemperatureCommand {
        city: "oslo".into(),
        value,
    }
}

#[tokio::test]
async fn real_query_handler_answers_without_mocks() -> Result<()> {
    let app = TestApplication::<App>::new();
    let client = app.create_client()?;

    let result: TemperatureQueryResult = client.get_json("/temperatures/oslo").await?;
    assert_eq!(result.value, 22.0);
    Ok(())
}

#[tokio::test]
async fn command_handler_mock_records_calls() -> Result<()> {
    let app = TestApplication::<App>::new();
    let handler = app.mock_command_handler::<TemperatureCommand>()?;
    let client = app.create_client()?;

    let response = client.post_json("/temperatures", &oslo(10.0)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    handler.verify(Times::once());
    handler.verify_with(Times::once(), |command| command.value == 10.0);
    handler.verify_with(Times::never(), |command| command.city == "bergen");
    assert_eq!(handler.received(), vec![oslo(10.0)]);

    client.post_json("/temperatures", &oslo(12.5)).await?;
    assert!(handler.check(Times::once()).is_err());
    handler.verify(Times::exactly(2));
    handler.verify_with(Times::once(), |command| command.value == 10.0);
    Ok(())
}

#[tokio::test]
async fn failing_command_mock_surfaces_as_server_error() -> Result<()> {
    let app = TestApplication::<App>::new();
    let handler = app
        .mock_command_handler::<TemperatureCommand>()?
        .fails_with("sensor offline");
    let client = app.create_client()?;

    let response = client.post_json("/temperatures", &oslo(10.0)).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json()?;
    assert_eq!(body["error"]["message"], "sensor offline");
    assert_eq!(body["error"]["status"], 500);
    handler.verify(Times::once());
    Ok(())
}

#[tokio::test]
async fn query_handler_mock_returns_programmed_result() -> Result<()> {
    let app = TestApplication::<App>::new();
    let handler = app
        .mock_query_handler::<TemperatureQuery>()?
        .returns(TemperatureQueryResult { value: 10.0 });
    let client = app.create_client()?;

    let result: TemperatureQueryResult = client.get_json("/temperatures/oslo").await?;
    assert_eq!(result.value, 10.0);

    handler.verify(Times::once());
    handler.verify_with(Times::once(), |query| query.city == "oslo");
    Ok(())
}

#[tokio::test]
async fn query_handler_mock_can_answer_per_query() -> Result<()> {
    let app = TestApplication::<App>::new();
    let handler = app
        .mock_query_handler::<TemperatureQuery>()?
        .returns_with(|query| {
            Ok(TemperatureQueryResult {
                value: query.city.len() as f64,
            })
        });
    let client = app.create_client()?;

    let oslo: TemperatureQueryResult = client.get_json("/temperatures/oslo").await?;
    let bergen: TemperatureQueryResult = client.get_json("/temperatures/bergen").await?;
    assert_eq!(oslo.value, 4.0);
    assert_eq!(bergen.value, 6.0);
    handler.verify(Times::exactly(2));
    Ok(())
}

#[tokio::test]
async fn unprogrammed_query_mock_answers_default() -> Result<()> {
    let app = TestApplication::<App>::new();
    let handler = app.mock_query_handler::<TemperatureQuery>()?;
    let client = app.create_client()?;

    let result: TemperatureQueryResult = client.get_json("/temperatures/oslo").await?;
    assert_eq!(result, TemperatureQueryResult::default());
    handler.verify(Times::once());
    Ok(())
}

#[tokio::test]
async fn strict_query_mock_fails_until_programmed() -> Result<()> {
    let app = TestApplication::<App>::new();
    let handler = app.mock_query_handler_strict::<TemperatureQuery>()?;
    let client = app.create_client()?;

    let response = client.get("/temperatures/oslo").await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json()?;
    assert!(
        body["error"]["message"]
            .as_str()
            .is_some_and(|message| message.contains("TemperatureQuery"))
    );
    handler.verify(Times::once());

    let handler = handler.returns(TemperatureQueryResult { value: 3.0 });
    let result: TemperatureQueryResult = client.get_json("/temperatures/oslo").await?;
    assert_eq!(result.value, 3.0);
    handler.verify(Times::exactly(2));
    Ok(())
}

#[tokio::test]
async fn logger_mock_captures_every_level() -> Result<()> {
    let app = TestApplication::<App>::new();
    let logger = app.mock_logger::<TemperatureCommand>()?;
    let client = app.create_client()?;

    client
        .post_json("/temperatures", &oslo(10.0))
        .await?
        .ensure_success()?;

    logger.verify_debug_message(Times::once(), Some("This is a debug message"));
    logger.verify_information_message(Times::once(), Some("This is an information message"));
    logger.verify_warning_message(Times::once(), Some("This is a warning message"));
    logger.verify_error_message(Times::once(), Some("This is an error message"));
    logger.verify_critical_message(Times::once(), Some("This is a critical message"));
    logger.verify_trace_message(Times::never(), None);
    logger.verify_information_message(Times::never(), Some("This message was never written"));

    let exception: &dyn Fn(Option<&str>) -> bool =
        &|error: Option<&str>| error == Some("This is an exception");
    logger.verify_logger(LogLevel::Error, Times::once(), None, Some(exception));

    let critical: &dyn Fn(Option<&str>) -> bool =
        &|error: Option<&str>| error.is_some_and(|text| text.contains("critical exception"));
    logger.verify_logger(LogLevel::Critical, Times::once(), None, Some(critical));

    assert_eq!(logger.entries().len(), 5);
    assert!(
        logger
            .entries_at(LogLevel::Debug)
            .iter()
            .all(|entry| entry.error.is_none())
    );
    Ok(())
}

#[tokio::test]
async fn later_mock_registration_wins() -> Result<()> {
    let app = TestApplication::<App>::new();
    let first = app.mock_command_handler::<TemperatureCommand>()?;
    let second = app.mock_command_handler::<TemperatureCommand>()?;
    let client = app.create_client()?;

    client.post_json("/temperatures", &oslo(10.0)).await?;

    first.verify(Times::never());
    second.verify(Times::once());
    Ok(())
}

#[tokio::test]
async fn arbitrary_service_can_be_replaced() -> Result<()> {
    let mut source = MockSource::new();
    source
        .expect_current()
        .times(2)
        .returning(|city| if city == "bergen" { 5.0 } else { -1.0 });

    let app = TestApplication::<App>::new();
    let registered = app.mock_service::<dyn TemperatureSource>(Arc::new(source))?;
    let client = app.create_client()?;

    let bergen: TemperatureQueryResult = client.get_json("/temperatures/bergen").await?;
    let oslo: TemperatureQueryResult = client.get_json("/temperatures/oslo").await?;
    assert_eq!(bergen.value, 5.0);
    assert_eq!(oslo.value, -1.0);

    let resolved = app.service::<dyn TemperatureSource>()?;
    assert!(Arc::ptr_eq(&registered, &resolved));
    Ok(())
}

#[tokio::test]
async fn handler_mock_registered_through_the_host_builder() -> Result<()> {
    let app = TestApplication::<App>::new();
    let handler = MockCommandHandler::<TemperatureCommand>::new();
    let registered = handler.clone();
    app.configure_host_builder(move |builder| {
        builder.configure_services(move |_, services| {
            services.add_singleton::<dyn CommandHandler<TemperatureCommand>>(
                Arc::new(registered),
            );
        });
        Ok(())
    })?;
    let client = app.create_client()?;

    client
        .post_json("/temperatures", &oslo(10.0))
        .await?
        .ensure_success()?;
    handler.verify_with(Times::once(), |command| command.city == "oslo");
    Ok(())
}

#[tokio::test]
async fn logger_mock_works_with_a_hand_built_handler() -> Result<()> {
    let app = TestApplication::<App>::new();
    let logger = app.mock_logger::<TemperatureCommand>()?;
    let resolved: Arc<dyn Logger<TemperatureCommand>> =
        app.services()?.logger::<TemperatureCommand>()?;

    TemperatureCommandHandler::new(resolved)
        .handle(oslo(1.0))
        .await?;
    logger.verify_warning_message(Times::once(), Some("warning"));
    Ok(())
}

#[test]
#[should_panic(expected = "verification failed for MockCommandHandler")]
fn unmet_verification_panics() {
    let handler = MockCommandHandler::<TemperatureCommand>::new();
    handler.verify(Times::once());
}
