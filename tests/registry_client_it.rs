// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use saml_provision::{
	_preludet::*,
	metadata::{BINDING_HTTP_REDIRECT, ConnectionDescriptor},
	registry::{ConnectionSummary, ListFilter},
};

fn descriptor() -> ConnectionDescriptor {
	ConnectionDescriptor {
		connection_name: "Acme-IT-Security".into(),
		idp_entity_id: "https://idp.acme.example/idp/shibboleth".into(),
		metadata_xml: "<EntityDescriptor entityID=\"https://idp.acme.example/idp/shibboleth\"/>"
			.into(),
		binding: Some(BINDING_HTTP_REDIRECT.into()),
	}
}

#[tokio::test]
async fn list_sends_filter_and_bearer_token() {
	let server = MockServer::start_async().await;
	let (client, _gate) = test_registry_client(&server.url("/api/v2/"), unthrottled_limits());
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v2/connections")
				.query_param("strategy", "samlp")
				.query_param("fields", "id,name")
				.header("authorization", "Bearer test-access-token");
			then.status(200)
				.header("content-type", "application/json")
				.body("[{\"id\":\"con_1\",\"name\":\"first\"},{\"id\":\"con_2\",\"name\":\"second\"}]");
		})
		.await;
	let connections =
		client.list(&ListFilter::default()).await.expect("Listing should succeed.");

	mock.assert_calls_async(1).await;

	assert_eq!(
		connections,
		vec![
			ConnectionSummary { id: "con_1".into(), name: "first".into() },
			ConnectionSummary { id: "con_2".into(), name: "second".into() },
		],
	);
}

#[tokio::test]
async fn list_failure_surfaces_status_and_body() {
	let server = MockServer::start_async().await;
	let (client, _gate) = test_registry_client(&server.url("/api/v2/"), unthrottled_limits());
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v2/connections");
			then.status(429).body("{\"message\":\"Too Many Requests\"}");
		})
		.await;
	let err = client.list(&ListFilter::default()).await.expect_err("Listing should fail.");

	match err {
		Error::Remote { status, body } => {
			assert_eq!(status, 429);
			assert!(body.contains("Too Many Requests"));
		},
		other => panic!("Unexpected error: {other:?}"),
	}
}

#[tokio::test]
async fn list_with_unexpected_shape_is_a_decode_error() {
	let server = MockServer::start_async().await;
	let (client, _gate) = test_registry_client(&server.url("/api/v2/"), unthrottled_limits());
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v2/connections");
			then.status(200).body("{\"connections\":[]}");
		})
		.await;
	let err = client.list(&ListFilter::default()).await.expect_err("Listing should fail.");

	assert!(matches!(err, Error::Decode { status: Some(200), .. }));
}

#[tokio::test]
async fn create_posts_the_saml_connection_body() {
	let server = MockServer::start_async().await;
	let (client, _gate) = test_registry_client(&server.url("/api/v2/"), unthrottled_limits());
	let descriptor = descriptor();
	let clients = vec!["client-a".to_owned()];
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v2/connections")
				.header("authorization", "Bearer test-access-token")
				.json_body(json!({
					"name": "Acme-IT-Security",
					"strategy": "samlp",
					"options": {
						"metadataXml": descriptor.metadata_xml,
						"entityId": "urn:sp:example",
						"protocolBinding": BINDING_HTTP_REDIRECT,
					},
					"enabled_clients": ["client-a"],
				}));
			then.status(201).header("content-type", "application/json").body(
				"{\"id\":\"con_new\",\"name\":\"Acme-IT-Security\",\"strategy\":\"samlp\",\"enabled_clients\":[\"client-a\"]}",
			);
		})
		.await;
	let connection = client
		.create(&descriptor, Some("urn:sp:example"), &clients)
		.await
		.expect("Creation should succeed.");

	mock.assert_calls_async(1).await;

	assert_eq!(connection.id, "con_new");
	assert_eq!(connection.strategy.as_deref(), Some("samlp"));
	assert_eq!(connection.enabled_clients, clients);
}

#[tokio::test]
async fn delete_targets_the_connection_path() {
	let server = MockServer::start_async().await;
	let (client, _gate) = test_registry_client(&server.url("/api/v2/"), unthrottled_limits());
	let mock = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/api/v2/connections/con_1");
			then.status(204);
		})
		.await;

	client.delete("con_1").await.expect("Deletion should succeed.");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn delete_failure_is_remote_error() {
	let server = MockServer::start_async().await;
	let (client, _gate) = test_registry_client(&server.url("/api/v2/"), unthrottled_limits());
	let _mock = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/api/v2/connections/con_gone");
			then.status(404).body("{\"message\":\"The connection does not exist\"}");
		})
		.await;
	let err = client.delete("con_gone").await.expect_err("Deletion should fail.");

	assert_eq!(err.status(), Some(404));
}
