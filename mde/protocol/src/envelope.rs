use data_encoding::BASE64;
use uuid::Uuid;

use mde_xml::{Cursor, Decoder, Element, Issue, Namespace, ValidationIssues};

use crate::error::{ProtocolError, ProtocolResult};

pub const ANONYMOUS_ADDRESS: &str = "http://www.w3.org/2005/08/addressing/anonymous";
pub const BASE64_ENCODING: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd#base64binary";

const JWT_TOKEN: &str = "urn:ietf:params:oauth:token-type:jwt";
const USER_TOKEN: &str =
    "http://schemas.microsoft.com/5.0.0.0/ConfigurationManager/Enrollment/DeviceEnrollmentUserToken";

/**
    Kind of binary security token carried in the request header.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Azure AD federated token.
    Jwt,
    /// Token handed out by the federated authentication page.
    DeviceEnrollmentUserToken,
}

const TOKEN_KINDS: [(&str, TokenKind); 2] = [
    (JWT_TOKEN, TokenKind::Jwt),
    (USER_TOKEN, TokenKind::DeviceEnrollmentUserToken),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityToken {
    Binary { kind: TokenKind, value: String },
    Username { username: String, password: String },
}

impl SecurityToken {
    /**
        The decoded bytes of a binary token.
    */
    pub fn binary_value(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            Self::Binary { value, .. } => decode_base64(value, "wsse:BinarySecurityToken"),
            Self::Username { .. } => Err(ProtocolError::InvalidBase64("wsse:UsernameToken")),
        }
    }
}

/**
    WS-Addressing and WS-Security header common to every request.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub action: String,
    pub message_id: String,
    pub reply_to: String,
    pub to: String,
    pub security: Option<SecurityToken>,
}

/**
    A request body that can be decoded from a SOAP envelope.
*/
pub trait SoapRequest: Sized {
    /// Literal `a:Action` the request must carry.
    const ACTION: &'static str;
    /// Action of the matching response, also used for faults.
    const RESPONSE_ACTION: &'static str;
    /// Namespaces that must be declared on `s:Envelope` besides `s` and `a`.
    const NAMESPACES: &'static [Namespace];

    fn decode_body(de: &mut Decoder, body: &Cursor<'_>) -> Self;
}

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub header: RequestHeader,
    pub body: T,
}

/**
    Parse and validate a request envelope.

    A wrong `a:Action` is reported as [`ProtocolError::ActionMismatch`]
    before the body is looked at. Every other mismatch is collected and
    returned together as [`ProtocolError::Validation`].
*/
pub fn decode_request<T: SoapRequest>(xml: &str) -> ProtocolResult<Envelope<T>> {
    let doc = mde_xml::parse(xml)?;
    let mut de = Decoder::new();
    let envelope = decode_envelope::<T>(&mut de, &doc)?;
    de.finish(envelope)?.ok_or_else(|| {
        ProtocolError::Validation(ValidationIssues::from(Issue {
            path: doc.name.clone(),
            message: "incomplete envelope".into(),
        }))
    })
}

fn decode_envelope<T: SoapRequest>(
    de: &mut Decoder,
    doc: &Element,
) -> ProtocolResult<Option<Envelope<T>>> {
    let Some(root) = de.root(doc, Namespace::Soap, "Envelope") else {
        return Ok(None);
    };

    let required = [Namespace::Soap, Namespace::Addressing];
    for ns in required.iter().chain(T::NAMESPACES) {
        let (key, uri) = ns.declaration();
        if root.element().attribute(&key) != Some(uri) {
            de.report(
                format!("{}@{key}", root.path()),
                format!("expected namespace declaration {uri}"),
            );
        }
    }

    let header = de
        .required(&root, Namespace::Soap, "Header")
        .map(|header| decode_header(de, &header));

    let action = header.as_ref().map_or("", |header| header.action.as_str());
    if !action.is_empty() && action != T::ACTION {
        return Err(ProtocolError::ActionMismatch {
            expected: T::ACTION,
            found: action.to_string(),
        });
    }

    let body = de
        .required(&root, Namespace::Soap, "Body")
        .map(|body| T::decode_body(de, &body));

    Ok(header.zip(body).map(|(header, body)| Envelope { header, body }))
}

fn decode_header(de: &mut Decoder, header: &Cursor<'_>) -> RequestHeader {
    let action = must_understand_text(de, header, Namespace::Addressing, "Action");
    let message_id = de.string(header, Namespace::Addressing, "MessageID");
    let reply_to = de
        .required(header, Namespace::Addressing, "ReplyTo")
        .map(|reply_to| de.string(&reply_to, Namespace::Addressing, "Address"))
        .unwrap_or_default();
    let to = must_understand_text(de, header, Namespace::Addressing, "To");
    let security = de
        .optional(header, Namespace::WsSecurity, "Security")
        .and_then(|security| decode_security(de, &security));

    RequestHeader {
        action,
        message_id,
        reply_to,
        to,
        security,
    }
}

fn decode_security(de: &mut Decoder, security: &Cursor<'_>) -> Option<SecurityToken> {
    de.literal_attribute(security, Some(Namespace::Soap), "mustUnderstand", "1");

    if let Some(token) = de.optional(security, Namespace::WsSecurity, "BinarySecurityToken") {
        let kind = de.attribute_one_of(&token, None, "ValueType", &TOKEN_KINDS);
        de.literal_attribute(&token, None, "EncodingType", BASE64_ENCODING);
        return kind.map(|kind| SecurityToken::Binary {
            kind,
            value: token.text(),
        });
    }

    if let Some(token) = de.optional(security, Namespace::WsSecurity, "UsernameToken") {
        return Some(SecurityToken::Username {
            username: de.string(&token, Namespace::WsSecurity, "Username"),
            password: de.string(&token, Namespace::WsSecurity, "Password"),
        });
    }

    de.report(
        security.path(),
        "expected a BinarySecurityToken or UsernameToken",
    );
    None
}

fn must_understand_text(de: &mut Decoder, parent: &Cursor<'_>, ns: Namespace, local: &str) -> String {
    match de.required(parent, ns, local) {
        Some(cursor) => {
            de.literal_attribute(&cursor, Some(Namespace::Soap), "mustUnderstand", "1");
            cursor.text()
        }
        None => String::new(),
    }
}

/**
    Decode base64 text that may be wrapped with line breaks.
*/
pub(crate) fn decode_base64(text: &str, field: &'static str) -> ProtocolResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|_| ProtocolError::InvalidBase64(field))
}

// ── Responses ──────────────────────────────────────────────────────────

/**
    Identifiers that tie a response to its request.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    /// The request's `a:MessageID`, verbatim.
    pub relates_to: String,
    pub correlation_id: String,
    pub activity_id: String,
}

impl CorrelationContext {
    /**
        Derive the context for one request. The correlation id is taken
        from a W3C `traceparent` header when one is present and valid.
    */
    pub fn new(message_id: &str, traceparent: Option<&str>) -> Self {
        Self {
            relates_to: message_id.to_string(),
            correlation_id: traceparent
                .and_then(trace_id)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            activity_id: Uuid::new_v4().to_string(),
        }
    }
}

/**
    Trace id of a `version-traceid-parentid-flags` header, formatted as a UUID.
*/
fn trace_id(traceparent: &str) -> Option<String> {
    let mut parts = traceparent.trim().split('-');
    let _version = parts.next()?;
    let trace = parts.next()?;
    if trace.len() != 32 || trace.bytes().all(|b| b == b'0') {
        return None;
    }
    Uuid::try_parse(trace).ok().map(|id| id.to_string())
}

pub(crate) fn must_understand(element: Element) -> Element {
    element.attr(Namespace::Soap.qualify("mustUnderstand"), "1")
}

/**
    Wrap a body in a response envelope with the standard header.

    `extra` namespaces are declared on `s:Envelope` after `s` and `a`,
    `security` is appended to the header after `a:RelatesTo`.
*/
pub(crate) fn response_envelope(
    action: &str,
    ctx: &CorrelationContext,
    extra: &[Namespace],
    security: Option<Element>,
    body: Element,
) -> Element {
    let mut header = Element::in_ns(Namespace::Soap, "Header")
        .child(must_understand(Element::in_ns(Namespace::Addressing, "Action")).text(action))
        .child(
            Element::new("ActivityId")
                .declare(Namespace::Diagnostics)
                .attr("CorrelationId", &ctx.correlation_id)
                .text(&ctx.activity_id),
        )
        .child(Element::in_ns(Namespace::Addressing, "RelatesTo").text(&ctx.relates_to));
    if let Some(security) = security {
        header.push(security);
    }

    let mut envelope = Element::in_ns(Namespace::Soap, "Envelope")
        .declare(Namespace::Soap)
        .declare(Namespace::Addressing);
    for ns in extra {
        envelope = envelope.declare(*ns);
    }
    envelope.child(header).child(body)
}
