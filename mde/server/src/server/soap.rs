use axum::{
    body::Body,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use url::Url;

use mde_protocol::{
    CorrelationContext, Envelope, Fault, FaultCode, SoapRequest, decode_request,
};
use mde_xml::Element;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/**
    Serialize an envelope into a SOAP response with an explicit length.
*/
pub(crate) fn soap_reply(status: StatusCode, envelope: &Element) -> Response {
    let xml = match mde_xml::to_string(envelope) {
        Ok(xml) => xml,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response envelope");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, xml.len())
        .body(Body::from(xml))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/**
    A fault on its way back to the client, together with the action and
    correlation of the request it answers.
*/
pub(crate) struct EnrollmentFault {
    pub fault: Fault,
    pub action: &'static str,
    pub ctx: CorrelationContext,
}

impl IntoResponse for EnrollmentFault {
    fn into_response(self) -> Response {
        let code = self.fault.code;
        tracing::debug!(
            subcode = code.subcode(),
            hresult = %format_args!("{:#010X}", code.hresult()),
            reason = %self.fault.reason,
            "sending fault"
        );
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        soap_reply(status, &self.fault.to_envelope(self.action, &self.ctx))
    }
}

/**
    Decode a request, check its addressing, and answer it with
    `handler`. Every failure is turned into a SOAP fault.
*/
pub(crate) fn respond<T, F>(
    endpoint: &'static str,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
    handler: F,
) -> Response
where
    T: SoapRequest,
    F: FnOnce(&Envelope<T>, &CorrelationContext) -> Result<Element, Fault>,
{
    let traceparent = headers.get("traceparent").and_then(|v| v.to_str().ok());

    let Ok(xml) = std::str::from_utf8(body) else {
        let ctx = CorrelationContext::new("", traceparent);
        tracing::warn!(endpoint, "request body is not UTF-8");
        return EnrollmentFault {
            fault: Fault::new(FaultCode::MessageFormat, "the request could not be parsed"),
            action: T::RESPONSE_ACTION,
            ctx,
        }
        .into_response();
    };

    let envelope = match decode_request::<T>(xml) {
        Ok(envelope) => envelope,
        Err(e) => {
            let ctx = CorrelationContext::new(&message_id_of(xml), traceparent);
            tracing::warn!(
                endpoint,
                message_id = %ctx.relates_to,
                activity_id = %ctx.activity_id,
                error = %e,
                "rejected request"
            );
            return EnrollmentFault {
                fault: Fault::from_error(&e),
                action: T::RESPONSE_ACTION,
                ctx,
            }
            .into_response();
        }
    };

    let ctx = CorrelationContext::new(&envelope.header.message_id, traceparent);
    let span = tracing::info_span!(
        "soap",
        endpoint,
        message_id = %ctx.relates_to,
        activity_id = %ctx.activity_id,
    );
    let result = span.in_scope(|| {
        if !addressed_to(&envelope.header.to, uri.path()) {
            tracing::warn!(to = %envelope.header.to, path = uri.path(), "request addressed elsewhere");
            return Err(Fault::new(
                FaultCode::EndpointUnavailable,
                "the request is addressed to a different endpoint",
            ));
        }
        handler(&envelope, &ctx)
    });

    match result {
        Ok(response) => soap_reply(StatusCode::OK, &response),
        Err(fault) => EnrollmentFault {
            fault,
            action: T::RESPONSE_ACTION,
            ctx,
        }
        .into_response(),
    }
}

/**
    Whether the `a:To` address names the path the request arrived on.
*/
fn addressed_to(to: &str, path: &str) -> bool {
    match Url::parse(to.trim()) {
        Ok(url) => url.path().eq_ignore_ascii_case(path),
        Err(_) => false,
    }
}

/**
    Best-effort `a:MessageID` of a request that failed validation.
*/
fn message_id_of(xml: &str) -> String {
    mde_xml::parse(xml)
        .ok()
        .and_then(|doc| {
            doc.find_path(&["Header", "MessageID"])
                .map(|id| id.text_content().trim().to_string())
        })
        .unwrap_or_default()
}
