//! SOAP envelopes: request building and response unwrapping

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::xml;
use crate::api::client::scalar_to_string;
use crate::error::{Result, SyncError};

pub const SOAP_11_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoapVersion {
    #[default]
    #[serde(rename = "1.1")]
    V11,
    #[serde(rename = "1.2")]
    V12,
}

impl SoapVersion {
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::V11 => SOAP_11_NAMESPACE,
            Self::V12 => SOAP_12_NAMESPACE,
        }
    }

    /// Content type header, carrying the action for SOAP 1.2
    pub fn content_type(&self, action: Option<&str>) -> String {
        match (self, action) {
            (Self::V11, _) => "text/xml; charset=utf-8".to_string(),
            (Self::V12, Some(action)) => {
                format!("application/soap+xml; charset=utf-8; action=\"{action}\"")
            }
            (Self::V12, None) => "application/soap+xml; charset=utf-8".to_string(),
        }
    }
}

/// SOAP call description from `sourceConfig.soap`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoapConfig {
    pub operation: String,
    /// Namespace of the operation element
    pub namespace: String,
    #[serde(default)]
    pub version: SoapVersion,
    /// SOAPAction; defaults to `<namespace>/<operation>`
    #[serde(default)]
    pub action: Option<String>,
    /// Parameter tree: objects become nested elements, arrays repeat the element
    #[serde(default)]
    pub parameters: Value,
}

impl SoapConfig {
    pub fn action(&self) -> String {
        self.action.clone().unwrap_or_else(|| {
            format!("{}/{}", self.namespace.trim_end_matches('/'), self.operation)
        })
    }

    pub fn content_type(&self) -> String {
        match self.version {
            SoapVersion::V11 => self.version.content_type(None),
            SoapVersion::V12 => self.version.content_type(Some(&self.action())),
        }
    }

    /// `SOAPAction` header; SOAP 1.2 carries the action in the content type instead
    pub fn action_header(&self) -> Option<(String, String)> {
        match self.version {
            SoapVersion::V11 => Some(("SOAPAction".to_string(), format!("\"{}\"", self.action()))),
            SoapVersion::V12 => None,
        }
    }
}

fn xml_err(e: impl std::fmt::Display) -> SyncError {
    SyncError::Xml(e.to_string())
}

/// Build the request envelope for `config`
pub fn build_envelope(config: &SoapConfig) -> Result<String> {
    if config.operation.is_empty() {
        return Err(SyncError::invalid_config("SOAP operation is required"));
    }

    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let mut envelope = BytesStart::new("soap:Envelope");
    envelope.push_attribute(("xmlns:soap", config.version.namespace()));
    envelope.push_attribute(("xmlns:ns", config.namespace.as_str()));
    writer.write_event(Event::Start(envelope)).map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("soap:Body")))
        .map_err(xml_err)?;

    let operation = format!("ns:{}", config.operation);
    write_element(&mut writer, &operation, &config.parameters)?;

    writer
        .write_event(Event::End(BytesEnd::new("soap:Body")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("soap:Envelope")))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
            return Ok(());
        }
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new(name)))
                .map_err(xml_err)?;
            return Ok(());
        }
        _ => {}
    }

    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                write_element(writer, &format!("ns:{key}"), child)?;
            }
        }
        scalar => {
            let text = scalar_to_string(scalar);
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(xml_err)?;
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

/// Unwrap `Envelope/Body/<first child>` and convert it
///
/// A `Fault` in the body becomes a `SourceFetch` error.
pub fn unwrap_response(text: &str) -> Result<Value> {
    let doc = xml::parse(text)?;
    let envelope = doc.root_element();
    if envelope.tag_name().name() != "Envelope" {
        return Err(SyncError::Xml(format!(
            "expected a SOAP Envelope, found <{}>",
            envelope.tag_name().name()
        )));
    }

    let body = envelope
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "Body")
        .ok_or_else(|| SyncError::Xml("SOAP envelope has no Body".into()))?;

    let Some(payload) = body.children().find(|n| n.is_element()) else {
        return Ok(Value::Null);
    };

    if payload.tag_name().name() == "Fault" {
        return Err(SyncError::SourceFetch(format!(
            "SOAP fault: {}",
            fault_message(payload)
        )));
    }

    Ok(xml::element_to_value(payload))
}

/// `faultstring` (1.1) or `Reason/Text` (1.2), falling back to the raw fault
fn fault_message(fault: roxmltree::Node<'_, '_>) -> String {
    let reason = fault
        .descendants()
        .find(|n| {
            n.is_element()
                && matches!(n.tag_name().name(), "faultstring" | "Text")
        })
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string());

    reason.unwrap_or_else(|| xml::element_to_value(fault).to_string())
}
