//! SAML federation metadata to connection descriptor transformation.
//!
//! [`transform`] parses an `EntitiesDescriptor` document, keeps the entities that act as
//! identity providers, and turns each of them into a [`ConnectionDescriptor`]:
//!
//! 1. The well-known namespaces the registry expects are declared on the entity element, along
//!    with any namespace it inherited from its ancestors, so the fragment stands alone.
//! 2. The first `KeyDescriptor` of the IdP descriptor defaults to `use="signing"`.
//! 3. `SingleSignOnService` endpoints with unsupported bindings are pruned; the first supported
//!    binding becomes the connection's protocol binding.
//! 4. The entity is serialized to a single line and named after its English organization
//!    display name, or after its entity ID.
//!
//! The transformation is pure: no network, no disk, only diagnostic logging.

pub mod naming;
pub mod tree;

// std
use std::path::Path;
// self
use crate::{
	_prelude::*,
	metadata::tree::{Element, Node},
};

/// HTTP-Redirect binding URI.
pub const BINDING_HTTP_REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
/// HTTP-POST binding URI.
pub const BINDING_HTTP_POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
/// Bindings the registry can use for SSO requests.
pub const SUPPORTED_BINDINGS: [&str; 2] = [BINDING_HTTP_REDIRECT, BINDING_HTTP_POST];

/// Namespace declarations added to every serialized entity.
pub const NAMESPACE_DECLARATIONS: [(&str, &str); 8] = [
	("xmlns:ds", "http://www.w3.org/2000/09/xmldsig#"),
	("xmlns:alg", "urn:oasis:names:tc:SAML:metadata:algsupport"),
	("xmlns:idpdisc", "urn:oasis:names:tc:SAML:profiles:SSO:idp-discovery-protocol"),
	("xmlns:init", "urn:oasis:names:tc:SAML:profiles:SSO:request-init"),
	("xmlns:mdrpi", "urn:oasis:names:tc:SAML:metadata:rpi"),
	("xmlns:mdui", "urn:oasis:names:tc:SAML:metadata:ui"),
	("xmlns:shibmd", "urn:mace:shibboleth:metadata:1.0"),
	("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
];

/// Metadata documents that cannot be read or lack the expected structure.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ParseError {
	/// The metadata source could not be read.
	#[error("Unable to read metadata from {source_name}: {message}.")]
	Unreadable {
		/// Path or label of the metadata source.
		source_name: String,
		/// Human-readable error payload.
		message: String,
	},
	/// The document is not well-formed XML.
	#[error("Metadata is not well-formed XML: {message}.")]
	Xml {
		/// Human-readable error payload.
		message: String,
	},
	/// No `EntitiesDescriptor` element exists.
	#[error("Metadata has no EntitiesDescriptor element.")]
	MissingEntitiesDescriptor,
	/// An identity provider entity lacks its `entityID` attribute.
	#[error("EntityDescriptor #{position} has no entityID attribute.")]
	MissingEntityId {
		/// One-based position among the `EntityDescriptor` elements.
		position: usize,
	},
}

/// Identity provider entities that cannot be given a connection name.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum NamingError {
	/// Neither the organization display name nor the entity ID yields a usable name.
	#[error("Entity `{entity_id}` has no usable English organization name or entity ID.")]
	Unnamed {
		/// Entity ID of the offending entity.
		entity_id: String,
	},
}

/// Connection ready to be created in the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionDescriptor {
	/// Sanitized connection name.
	pub connection_name: String,
	/// Entity ID of the identity provider.
	pub idp_entity_id: String,
	/// Single-line metadata of the identity provider.
	pub metadata_xml: String,
	/// First supported SSO binding, if any.
	pub binding: Option<String>,
}

/// Outcome of transforming one metadata document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transformation {
	/// Descriptors ready to be created, in document order.
	pub descriptors: Vec<ConnectionDescriptor>,
	/// Identity providers skipped because no connection name could be derived, in document
	/// order.
	pub unnamed: Vec<NamingError>,
}

/// Transforms a metadata file on disk.
pub fn transform_file(path: &Path, limit: Option<usize>) -> Result<Transformation> {
	let bytes = std::fs::read(path).map_err(|e| ParseError::Unreadable {
		source_name: path.display().to_string(),
		message: e.to_string(),
	})?;

	transform_bytes(&bytes, limit)
}

/// Transforms a UTF-8 encoded metadata document.
pub fn transform_bytes(document: &[u8], limit: Option<usize>) -> Result<Transformation> {
	let document = std::str::from_utf8(document).map_err(|e| ParseError::Xml {
		message: format!("document is not valid UTF-8: {e}"),
	})?;

	transform(document, limit)
}

/// Transforms a metadata document into connection descriptors.
///
/// Only entities with an `IDPSSODescriptor` are kept; when `limit` is positive only the first
/// `limit` of them are processed. Output order follows document order.
///
/// Structural problems fail the whole document. An entity that cannot be named is skipped and
/// reported in [`Transformation::unnamed`] while its siblings are still transformed.
pub fn transform(document: &str, limit: Option<usize>) -> Result<Transformation> {
	let root = tree::parse(document)?;
	let (entities_descriptor, scope) = take_first(root, "EntitiesDescriptor", Vec::new())
		.ok_or(ParseError::MissingEntitiesDescriptor)?;
	let scope = merge_scope(scope, &entities_descriptor);
	let mut entities = Vec::new();

	collect_entities(entities_descriptor, scope, &mut entities);

	tracing::info!(total = entities.len(), "total entities found");

	let identity_providers = entities
		.into_iter()
		.enumerate()
		.filter(|(_, (entity, _))| entity.find("IDPSSODescriptor").is_some())
		.take(limit.filter(|limit| *limit > 0).unwrap_or(usize::MAX))
		.collect::<Vec<_>>();

	tracing::info!(count = identity_providers.len(), "processing identity provider entities");

	let mut transformation = Transformation::default();

	for (index, (entity, scope)) in identity_providers {
		let record = EntityRecord::new(entity, index + 1)?;

		tracing::debug!(entity_id = %record.entity_id, "transforming entity");

		match record.into_descriptor(&scope) {
			Ok(descriptor) => transformation.descriptors.push(descriptor),
			Err(e) => {
				tracing::warn!(error = %e, "skipping entity");

				transformation.unnamed.push(e);
			},
		}
	}

	Ok(transformation)
}

/// Namespace declarations in scope for an element, nearest declaration last.
type Scope = Vec<(String, String)>;

/// One identity provider entity being transformed.
#[derive(Debug)]
struct EntityRecord {
	entity_id: String,
	element: Element,
	supported_binding: Option<String>,
}
impl EntityRecord {
	fn new(element: Element, position: usize) -> Result<Self, ParseError> {
		let entity_id = element
			.attribute("entityID")
			.map(str::trim)
			.filter(|id| !id.is_empty())
			.ok_or(ParseError::MissingEntityId { position })?
			.to_owned();

		Ok(Self { entity_id, element, supported_binding: None })
	}

	fn into_descriptor(mut self, scope: &Scope) -> Result<ConnectionDescriptor, NamingError> {
		self.declare_namespaces(scope);
		self.default_key_use();
		self.prune_bindings();

		let connection_name = self.connection_name()?;
		let metadata_xml = normalize_xml(&self.element.to_xml());

		Ok(ConnectionDescriptor {
			connection_name,
			idp_entity_id: self.entity_id,
			metadata_xml,
			binding: self.supported_binding,
		})
	}

	fn declare_namespaces(&mut self, scope: &Scope) {
		for (name, uri) in scope {
			if self.element.attribute(name).is_none() {
				self.element.set_attribute(name, uri);
			}
		}
		for (name, uri) in NAMESPACE_DECLARATIONS {
			self.element.set_attribute(name, uri);
		}
	}

	fn default_key_use(&mut self) {
		let key = self
			.element
			.find_mut("IDPSSODescriptor")
			.and_then(|idp| idp.find_mut("KeyDescriptor"));

		match key {
			Some(key) if key.attribute("use").is_none() => key.set_attribute("use", "signing"),
			Some(_) => {},
			None => tracing::debug!(entity_id = %self.entity_id, "entity has no KeyDescriptor"),
		}
	}

	fn prune_bindings(&mut self) {
		let Some(idp) = self.element.find_mut("IDPSSODescriptor") else {
			return;
		};
		let mut first_supported = None;

		idp.children.retain(|node| {
			let Node::Element(child) = node else {
				return true;
			};

			if child.local_name() != "SingleSignOnService" {
				return true;
			}

			match child.attribute("Binding") {
				Some(binding) if SUPPORTED_BINDINGS.contains(&binding) => {
					if first_supported.is_none() {
						first_supported = Some(binding.to_owned());
					}

					true
				},
				binding => {
					tracing::debug!(binding = binding.unwrap_or_default(), "pruning SSO endpoint");

					false
				},
			}
		});

		self.supported_binding = first_supported;
	}

	fn connection_name(&self) -> Result<String, NamingError> {
		if let Some(organization) = self.element.find("Organization") {
			let english = organization
				.find_all("OrganizationDisplayName")
				.into_iter()
				.find(|name| name.attribute("xml:lang") == Some("en"));

			match english.map(|name| naming::from_display_name(&name.text())) {
				Some(name) if !name.is_empty() => return Ok(name),
				Some(_) => tracing::warn!(
					entity_id = %self.entity_id,
					"English organization name has no usable characters, using the entity ID"
				),
				None => tracing::warn!(
					entity_id = %self.entity_id,
					"organization has no English display name, using the entity ID"
				),
			}
		}

		let name = naming::from_entity_id(&self.entity_id);

		if name.is_empty() {
			return Err(NamingError::Unnamed { entity_id: self.entity_id.clone() });
		}

		Ok(name)
	}
}

/// Collapses serialized XML into a single line.
///
/// Carriage returns, newlines and tabs are removed everywhere; whitespace between the end of
/// one tag and the start of the next is removed entirely.
pub fn normalize_xml(xml: &str) -> String {
	let mut out = String::with_capacity(xml.len());
	let mut gap = String::new();
	let mut after_tag = false;

	for c in xml.chars().filter(|c| !matches!(c, '\r' | '\n' | '\t')) {
		if after_tag && c.is_whitespace() {
			gap.push(c);

			continue;
		}
		if c != '<' {
			out.push_str(&gap);
		}

		gap.clear();
		out.push(c);
		after_tag = c == '>';
	}

	out.push_str(&gap);

	out
}

fn merge_scope(mut scope: Scope, element: &Element) -> Scope {
	for (name, uri) in element.namespace_declarations() {
		scope.retain(|(existing, _)| existing != name);
		scope.push((name.clone(), uri.clone()));
	}

	scope
}

/// Detaches the first element named `local` (the root included), with the namespace scope of
/// its ancestors.
fn take_first(element: Element, local: &str, scope: Scope) -> Option<(Element, Scope)> {
	if element.local_name() == local {
		return Some((element, scope));
	}

	let scope = merge_scope(scope, &element);

	element.children.into_iter().find_map(|node| match node {
		Node::Element(child) => take_first(child, local, scope.clone()),
		_ => None,
	})
}

/// Detaches every `EntityDescriptor` below `element` (nested `EntitiesDescriptor` groups
/// included) in document order, each with its inherited namespace scope.
fn collect_entities(element: Element, scope: Scope, out: &mut Vec<(Element, Scope)>) {
	for node in element.children {
		let Node::Element(child) = node else {
			continue;
		};

		if child.local_name() == "EntityDescriptor" {
			out.push((child, scope.clone()));
		} else {
			let child_scope = merge_scope(scope.clone(), &child);

			collect_entities(child, child_scope, out);
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const IDP_A: &str = r#"<EntityDescriptor entityID="https://idp.example.com/saml/meta">
		<IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
			<KeyDescriptor>
				<ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:X509Data/></ds:KeyInfo>
			</KeyDescriptor>
			<SingleSignOnService Binding="urn:mace:shibboleth:1.0:profiles:AuthnRequest" Location="https://idp.example.com/shib"/>
			<SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://idp.example.com/post"/>
			<SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.com/redirect"/>
		</IDPSSODescriptor>
	</EntityDescriptor>"#;

	fn document(entities: &[&str]) -> String {
		format!(
			"<?xml version=\"1.0\"?>\n<EntitiesDescriptor xmlns=\"urn:oasis:names:tc:SAML:2.0:metadata\" Name=\"test\">\n{}\n</EntitiesDescriptor>",
			entities.join("\n"),
		)
	}

	fn single(entity: &str) -> ConnectionDescriptor {
		transform(&document(&[entity]), None)
			.expect("Fixture should transform.")
			.descriptors
			.pop()
			.expect("Fixture should produce one descriptor.")
	}

	#[test]
	fn prunes_unsupported_bindings_and_records_the_first_supported() {
		let descriptor = single(IDP_A);

		assert_eq!(descriptor.binding.as_deref(), Some(BINDING_HTTP_POST));
		assert!(!descriptor.metadata_xml.contains("AuthnRequest"));
		assert!(descriptor.metadata_xml.contains("https://idp.example.com/post"));
		assert!(descriptor.metadata_xml.contains("https://idp.example.com/redirect"));
	}

	#[test]
	fn entity_without_supported_bindings_has_no_binding() {
		let descriptor = single(
			r#"<EntityDescriptor entityID="urn:mace:example:legacy">
				<IDPSSODescriptor>
					<SingleSignOnService Binding="urn:mace:shibboleth:1.0:profiles:AuthnRequest" Location="https://legacy/sso"/>
				</IDPSSODescriptor>
			</EntityDescriptor>"#,
		);

		assert_eq!(descriptor.binding, None);
		assert!(!descriptor.metadata_xml.contains("SingleSignOnService"));
		assert_eq!(descriptor.connection_name, "mace-example-legacy");
	}

	#[test]
	fn key_descriptor_defaults_to_signing() {
		let descriptor = single(IDP_A);

		assert!(descriptor.metadata_xml.contains("<KeyDescriptor use=\"signing\">"));
	}

	#[test]
	fn explicit_key_use_is_kept() {
		let descriptor = single(
			r#"<EntityDescriptor entityID="https://idp.example.org">
				<IDPSSODescriptor><KeyDescriptor use="encryption"/></IDPSSODescriptor>
			</EntityDescriptor>"#,
		);

		assert!(descriptor.metadata_xml.contains("<KeyDescriptor use=\"encryption\"/>"));
		assert!(!descriptor.metadata_xml.contains("signing"));
	}

	#[test]
	fn declares_fixed_and_inherited_namespaces() {
		let descriptor = single(IDP_A);

		for (name, uri) in NAMESPACE_DECLARATIONS {
			assert!(
				descriptor.metadata_xml.contains(&format!("{name}=\"{uri}\"")),
				"Missing namespace declaration {name}.",
			);
		}

		assert!(
			descriptor
				.metadata_xml
				.starts_with("<EntityDescriptor entityID=\"https://idp.example.com/saml/meta\" xmlns=\"urn:oasis:names:tc:SAML:2.0:metadata\"")
		);
	}

	#[test]
	fn metadata_is_a_single_line_without_gaps_between_tags() {
		let descriptor = single(IDP_A);
		let xml = &descriptor.metadata_xml;

		assert!(!xml.contains(['\n', '\r', '\t']));
		assert!(!xml.contains("> "));
		assert!(!xml.contains(" <"));
		assert!(xml.ends_with("</EntityDescriptor>"));
		assert!(tree::parse(xml).is_ok());
	}

	#[test]
	fn english_organization_name_wins() {
		let descriptor = single(
			r#"<EntityDescriptor entityID="https://idp.example.com/saml/meta">
				<IDPSSODescriptor/>
				<Organization>
					<OrganizationName xml:lang="en">acme</OrganizationName>
					<OrganizationDisplayName xml:lang="de">Acme GmbH</OrganizationDisplayName>
					<OrganizationDisplayName xml:lang="en">Acme:  IT / Security.</OrganizationDisplayName>
				</Organization>
			</EntityDescriptor>"#,
		);

		assert_eq!(descriptor.connection_name, "Acme-IT-Security");
		assert_eq!(descriptor.idp_entity_id, "https://idp.example.com/saml/meta");
	}

	#[test]
	fn organization_without_english_name_falls_back_to_entity_id() {
		let descriptor = single(
			r#"<EntityDescriptor entityID="https://idp.example.com/saml/meta">
				<IDPSSODescriptor/>
				<Organization>
					<OrganizationDisplayName xml:lang="fr">Acme France</OrganizationDisplayName>
				</Organization>
			</EntityDescriptor>"#,
		);

		assert_eq!(descriptor.connection_name, "idp-example-com-saml-meta");
	}

	#[test]
	fn entity_id_names_entities_without_organization() {
		assert_eq!(single(IDP_A).connection_name, "idp-example-com-saml-meta");
	}

	#[test]
	fn unnamed_entities_are_skipped_without_dropping_siblings() {
		let doc = document(&[
			r#"<EntityDescriptor entityID="https://good.example.com/idp"><IDPSSODescriptor/></EntityDescriptor>"#,
			r#"<EntityDescriptor entityID="opaque"><IDPSSODescriptor/></EntityDescriptor>"#,
			r#"<EntityDescriptor entityID="https://also-good.example.com/idp"><IDPSSODescriptor/></EntityDescriptor>"#,
		]);
		let transformation =
			transform(&doc, None).expect("Unnamed entities should not fail the document.");
		let names =
			transformation.descriptors.iter().map(|d| d.connection_name.as_str()).collect::<Vec<_>>();

		assert_eq!(names, vec!["good-example-com-idp", "also-good-example-com-idp"]);
		assert_eq!(
			transformation.unnamed,
			vec![NamingError::Unnamed { entity_id: "opaque".into() }],
		);
	}

	#[test]
	fn limit_keeps_the_first_identity_providers_in_document_order() {
		let sp = r#"<EntityDescriptor entityID="https://sp.example.com"><SPSSODescriptor/></EntityDescriptor>"#;
		let idp_b = r#"<EntityDescriptor entityID="https://idp-b.example.com"><IDPSSODescriptor/></EntityDescriptor>"#;
		let doc = document(&[sp, IDP_A, idp_b]);
		let limited = transform(&doc, Some(1)).expect("Document should transform.").descriptors;

		assert_eq!(limited.len(), 1);
		assert_eq!(limited[0].idp_entity_id, "https://idp.example.com/saml/meta");

		let all = transform(&doc, None).expect("Document should transform.").descriptors;
		let ids = all.iter().map(|d| d.idp_entity_id.as_str()).collect::<Vec<_>>();

		assert_eq!(ids, vec!["https://idp.example.com/saml/meta", "https://idp-b.example.com"]);
		assert_eq!(transform(&doc, Some(0)).expect("Zero limit means no limit.").descriptors.len(), 2);
		assert_eq!(transform(&doc, Some(10)).expect("Large limit is fine.").descriptors.len(), 2);
	}

	#[test]
	fn prefixed_and_nested_documents_are_supported() {
		let doc = r#"<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata">
			<md:EntitiesDescriptor Name="inner">
				<md:EntityDescriptor entityID="https://nested.example.com/idp">
					<md:IDPSSODescriptor>
						<md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://nested.example.com/sso"/>
					</md:IDPSSODescriptor>
				</md:EntityDescriptor>
			</md:EntitiesDescriptor>
		</md:EntitiesDescriptor>"#;
		let descriptors =
			transform(doc, None).expect("Prefixed document should transform.").descriptors;

		assert_eq!(descriptors.len(), 1);
		assert_eq!(descriptors[0].binding.as_deref(), Some(BINDING_HTTP_REDIRECT));
		assert!(
			descriptors[0]
				.metadata_xml
				.contains("xmlns:md=\"urn:oasis:names:tc:SAML:2.0:metadata\"")
		);
	}

	#[test]
	fn structural_problems_are_parse_errors() {
		assert!(matches!(transform("<broken", None), Err(Error::Parse(ParseError::Xml { .. }))));
		assert!(matches!(
			transform("<EntityDescriptor entityID=\"x\"/>", None),
			Err(Error::Parse(ParseError::MissingEntitiesDescriptor))
		));
		assert!(matches!(
			transform(&document(&["<EntityDescriptor><IDPSSODescriptor/></EntityDescriptor>"]), None),
			Err(Error::Parse(ParseError::MissingEntityId { position: 1 }))
		));
		assert!(matches!(
			transform_bytes(&[0xff, 0xfe], None),
			Err(Error::Parse(ParseError::Xml { .. }))
		));
	}

	#[test]
	fn non_identity_providers_are_dropped_silently() {
		let sp = r#"<EntityDescriptor><SPSSODescriptor/></EntityDescriptor>"#;

		let transformation = transform(&document(&[sp]), None).expect("SP-only metadata is valid.");

		assert!(transformation.descriptors.is_empty());
		assert!(transformation.unnamed.is_empty());
	}

	#[test]
	fn normalize_removes_line_breaks_and_inter_tag_whitespace() {
		assert_eq!(
			normalize_xml("<a>\r\n\t<b> text </b>   <c/>\n</a>"),
			"<a><b> text </b><c/></a>",
		);
		assert_eq!(normalize_xml("<a> x</a>  "), "<a> x</a>  ");
	}
}
