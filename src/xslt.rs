//! The XSLT transformation pipeline (spec §4.5): look up the stylesheet and
//! its declared schema, validate, transform.
//!
//! All parsing here runs with external DTD loading and network access
//! disabled — the defense against XXE the spec calls for.

use std::collections::HashMap as StdHashMap;

use libxml::parser::Parser;
use libxml::schemas::{SchemaParserContext, SchemaValidationContext};
use libxslt::stylesheet::Stylesheet;
use uuid::Uuid;

use crate::error::HybridServerError;
use crate::resource::ResourceKind;
use crate::store::WebResourceStore;

/// Runs the five-step pipeline against the already-fetched XML document.
/// Returns the transform's reported MIME type and the transformed body.
pub async fn transform(
    stores: &StdHashMap<ResourceKind, std::sync::Arc<dyn WebResourceStore>>,
    xml_content: &str,
    xslt_uuid: Uuid,
) -> Result<(String, String), HybridServerError> {
    // 1. Look up the XSLT.
    let xslt_store = stores
        .get(&ResourceKind::Xslt)
        .expect("every resource kind has a configured store");
    let xslt = xslt_store
        .get(xslt_uuid)
        .await?
        .ok_or(HybridServerError::NotFound)?;

    // 2. Look up the XSD it declares itself validated against.
    let xsd_uuid = xslt.xsd.ok_or_else(|| {
        HybridServerError::Validation("stored xslt resource has no xsd link".to_string())
    })?;
    let xsd_store = stores
        .get(&ResourceKind::Xsd)
        .expect("every resource kind has a configured store");
    let xsd = xsd_store
        .get(xsd_uuid)
        .await?
        .ok_or(HybridServerError::NotFound)?;

    let parser = xxe_safe_parser();

    // 3. Validate the XML against the XSD.
    let xml_doc = parser
        .parse_string(xml_content)
        .map_err(|e| HybridServerError::Validation(format!("could not parse xml document: {e:?}")))?;

    let mut schema_parser = SchemaParserContext::from_buffer(xsd.content.as_bytes());
    let mut schema = SchemaValidationContext::from_parser(&mut schema_parser)
        .map_err(|e| HybridServerError::Validation(format!("invalid xsd schema: {e:?}")))?;
    schema.validate_document(&xml_doc).map_err(|errors| {
        let reasons: Vec<String> = errors.iter().map(|e| e.message.clone().unwrap_or_default()).collect();
        HybridServerError::Validation(format!("schema validation failed: {}", reasons.join("; ")))
    })?;

    // 4. Apply the stylesheet.
    let stylesheet_doc = parser
        .parse_string(&xslt.content)
        .map_err(|e| HybridServerError::Validation(format!("could not parse xslt stylesheet: {e:?}")))?;
    let stylesheet = Stylesheet::new(stylesheet_doc)
        .map_err(|e| HybridServerError::Validation(format!("invalid xslt stylesheet: {e:?}")))?;
    let result_doc = stylesheet
        .transform(&xml_doc, StdHashMap::new())
        .map_err(|e| HybridServerError::Validation(format!("xslt transform failed: {e:?}")))?;

    // 5. Report the transform's declared output media type, falling back
    // to application/xml (spec §4.5: "typically application/xml or
    // text/html").
    let mime_type = stylesheet
        .output_media_type()
        .unwrap_or_else(|| "application/xml".to_string());
    let body = result_doc.to_string();

    Ok((mime_type, body))
}

fn xxe_safe_parser() -> Parser {
    let mut parser = Parser::default();
    parser.set_no_net(true);
    parser.set_no_entities(true);
    parser
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::WebResource;
    use crate::store::{MemoryStore, WebResourceStore};
    use std::sync::Arc;

    const XSD: &str = r#"<?xml version="1.0"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <xsd:element name="greeting" type="xsd:string"/>
</xsd:schema>"#;

    const XSLT: &str = r#"<?xml version="1.0"?>
<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:output method="text"/>
  <xsl:template match="/greeting">Hello, <xsl:value-of select="."/>!</xsl:template>
</xsl:stylesheet>"#;

    async fn stores_with(
        xsd_content: &str,
        xslt_content: &str,
    ) -> (StdHashMap<ResourceKind, Arc<dyn WebResourceStore>>, Uuid) {
        let xsd_store = Arc::new(MemoryStore::new(ResourceKind::Xsd));
        let xsd_uuid = Uuid::new_v4();
        xsd_store
            .put(WebResource::new(ResourceKind::Xsd, xsd_uuid, xsd_content.to_string(), None))
            .await
            .unwrap();

        let xslt_store = Arc::new(MemoryStore::new(ResourceKind::Xslt));
        let xslt_uuid = Uuid::new_v4();
        xslt_store
            .put(WebResource::new(
                ResourceKind::Xslt,
                xslt_uuid,
                xslt_content.to_string(),
                Some(xsd_uuid),
            ))
            .await
            .unwrap();

        let mut stores: StdHashMap<ResourceKind, Arc<dyn WebResourceStore>> = StdHashMap::new();
        stores.insert(ResourceKind::Xsd, xsd_store);
        stores.insert(ResourceKind::Xslt, xslt_store);
        (stores, xslt_uuid)
    }

    #[tokio::test]
    async fn transforms_a_document_that_matches_its_schema() {
        let (stores, xslt_uuid) = stores_with(XSD, XSLT).await;
        let (_mime_type, body) = transform(&stores, "<greeting>world</greeting>", xslt_uuid)
            .await
            .unwrap();
        assert_eq!(body, "Hello, world!");
    }

    #[tokio::test]
    async fn rejects_a_document_that_fails_schema_validation() {
        let (stores, xslt_uuid) = stores_with(XSD, XSLT).await;
        let err = transform(&stores, "<wrong-root>world</wrong-root>", xslt_uuid)
            .await
            .unwrap_err();
        assert!(matches!(err, HybridServerError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_xslt_uuid_is_not_found() {
        let (stores, _) = stores_with(XSD, XSLT).await;
        let err = transform(&stores, "<greeting>world</greeting>", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, HybridServerError::NotFound));
    }
}
