//! Wire models for the connection registry endpoints.

// self
use crate::{_prelude::*, metadata::ConnectionDescriptor};

/// Strategy identifier of SAML connections.
pub const SAML_STRATEGY: &str = "samlp";

/// Listing entry returned by `GET /connections` with `fields=id,name`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionSummary {
	/// Opaque connection identifier.
	pub id: String,
	/// Connection name.
	#[serde(default)]
	pub name: String,
}

/// Connection returned by `POST /connections`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Connection {
	/// Opaque connection identifier.
	pub id: String,
	/// Connection name.
	#[serde(default)]
	pub name: String,
	/// Connection strategy, `samlp` for everything this crate creates.
	#[serde(default)]
	pub strategy: Option<String>,
	/// Client identifiers the connection is enabled for.
	#[serde(default)]
	pub enabled_clients: Vec<String>,
}

/// Query of `GET /connections`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListFilter {
	/// Strategy to match.
	pub strategy: String,
	/// Fields to include in each entry.
	pub fields: Vec<String>,
}
impl ListFilter {
	/// Query pairs as sent on the wire.
	pub fn query(&self) -> [(&'static str, String); 2] {
		[("strategy", self.strategy.clone()), ("fields", self.fields.join(","))]
	}
}
impl Default for ListFilter {
	fn default() -> Self {
		Self { strategy: SAML_STRATEGY.into(), fields: vec!["id".into(), "name".into()] }
	}
}

/// Body of `POST /connections`.
#[derive(Clone, Debug, Serialize)]
pub struct NewConnection<'a> {
	/// Connection name.
	pub name: &'a str,
	/// Always [`SAML_STRATEGY`].
	pub strategy: &'static str,
	/// SAML options.
	pub options: SamlOptions<'a>,
	/// Client identifiers to enable the connection for.
	pub enabled_clients: &'a [String],
}
impl<'a> NewConnection<'a> {
	/// Builds the creation body for one descriptor.
	///
	/// `sp_entity_id` is the service provider's own entity ID, not the identity provider's.
	pub fn saml(
		descriptor: &'a ConnectionDescriptor,
		sp_entity_id: Option<&'a str>,
		enabled_clients: &'a [String],
	) -> Self {
		Self {
			name: &descriptor.connection_name,
			strategy: SAML_STRATEGY,
			options: SamlOptions {
				metadata_xml: &descriptor.metadata_xml,
				entity_id: sp_entity_id,
				protocol_binding: descriptor.binding.as_deref(),
			},
			enabled_clients,
		}
	}
}

/// `options` object of a SAML connection.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SamlOptions<'a> {
	/// Single-line IdP metadata.
	pub metadata_xml: &'a str,
	/// Service provider entity ID.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub entity_id: Option<&'a str>,
	/// SSO binding used towards the IdP.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub protocol_binding: Option<&'a str>,
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn creation_body_matches_the_registry_shape() {
		let descriptor = ConnectionDescriptor {
			connection_name: "idp-example-com".into(),
			idp_entity_id: "https://idp.example.com".into(),
			metadata_xml: "<EntityDescriptor/>".into(),
			binding: Some(crate::metadata::BINDING_HTTP_POST.into()),
		};
		let clients = vec!["client-a".to_owned(), "client-b".to_owned()];
		let body = NewConnection::saml(&descriptor, Some("urn:sp:example"), &clients);

		assert_eq!(
			serde_json::to_value(&body).expect("Body should serialize."),
			json!({
				"name": "idp-example-com",
				"strategy": "samlp",
				"options": {
					"metadataXml": "<EntityDescriptor/>",
					"entityId": "urn:sp:example",
					"protocolBinding": "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST",
				},
				"enabled_clients": ["client-a", "client-b"],
			}),
		);
	}

	#[test]
	fn absent_options_are_omitted() {
		let descriptor = ConnectionDescriptor {
			connection_name: "legacy".into(),
			idp_entity_id: "urn:legacy".into(),
			metadata_xml: "<EntityDescriptor/>".into(),
			binding: None,
		};
		let body = NewConnection::saml(&descriptor, None, &[]);
		let value = serde_json::to_value(&body).expect("Body should serialize.");

		assert_eq!(value["options"], json!({ "metadataXml": "<EntityDescriptor/>" }));
		assert_eq!(value["enabled_clients"], json!([]));
	}

	#[test]
	fn default_filter_lists_saml_ids_and_names() {
		assert_eq!(
			ListFilter::default().query(),
			[("strategy", "samlp".to_owned()), ("fields", "id,name".to_owned())],
		);
	}
}
