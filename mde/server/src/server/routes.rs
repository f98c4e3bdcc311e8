use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use quick_xml::escape::escape;
use url::Url;

use mde_pki::{EnrollmentType, IssuanceError, IssueRequest};
use mde_protocol::wap::enrollment_profile;
use mde_protocol::{
    AuthPolicy, DiscoveryRequest, DiscoveryResponse, EnrollmentRequest, EnrollmentResponse,
    Envelope, Fault, FaultCode, PolicyRequest, PolicyResponse, SecurityToken, TokenKind,
};

use super::soap::respond;
use super::{AppState, CertificateRecord};

/// Value passed back to the client once the terms are accepted.
const TOS_OPAQUE_BLOB: &str = "mde-terms-accepted";

/// Principal named in tokens when the client sends no `login_hint`.
const ANONYMOUS_PRINCIPAL: &str = "federated-user";

type Params = Query<HashMap<String, String>>;

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

/// Federated login page. Posts a signed token back to the enrollment client.
pub async fn authenticate(State(state): State<AppState>, Query(params): Params) -> Response {
    let Some(appru) = param(&params, "appru") else {
        return (StatusCode::BAD_REQUEST, "appru is required").into_response();
    };
    let principal = param(&params, "login_hint").unwrap_or(ANONYMOUS_PRINCIPAL);

    let token = match state.tokens.issue(principal) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "failed to issue federation token");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    tracing::info!(principal, "issued federation token");

    Html(format!(
        r#"<h3>MDM Federated Login</h3><form id="loginForm" method="post" action="{}"><p><input type="hidden" name="wresult" value="{}" /></p><input type="submit" value="Login" /></form><script>document.getElementById('loginForm').submit()</script>"#,
        escape(appru),
        escape(token.as_str()),
    ))
    .into_response()
}

/// Terms of service shown during Azure AD joins.
pub async fn terms_of_service(Query(params): Params) -> Response {
    let Some(redirect_uri) = param(&params, "redirect_uri") else {
        return (StatusCode::BAD_REQUEST, "redirect_uri is required").into_response();
    };
    let Ok(mut accept) = Url::parse(redirect_uri) else {
        return (StatusCode::BAD_REQUEST, "redirect_uri is not a valid URL").into_response();
    };
    accept
        .query_pairs_mut()
        .append_pair("IsAccepted", "true")
        .append_pair("OpaqueBlob", TOS_OPAQUE_BLOB);

    Html(format!(
        r#"<h3>Terms of Service</h3><p>This device will be managed by your organization.</p><a href="{}">Accept</a>"#,
        escape(accept.as_str()),
    ))
    .into_response()
}

/// Lets the client probe the domain for an enrollment server.
pub async fn discovery_probe() -> StatusCode {
    StatusCode::OK
}

pub async fn discovery(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond::<DiscoveryRequest, _>("discovery", &uri, &headers, &body, |envelope, ctx| {
        let request = &envelope.body;
        if !request.supports(AuthPolicy::Federated) {
            tracing::warn!(
                offered = ?request.auth_policies,
                "client did not offer federated authentication"
            );
        }
        tracing::info!(
            email = %request.email_address,
            version = %request.request_version,
            "discovery"
        );
        let response = DiscoveryResponse {
            auth_policy: AuthPolicy::Federated,
            enrollment_version: request.negotiated_version(),
            enrollment_policy_service_url: state.config.service_url("Policy.svc"),
            enrollment_service_url: state.config.service_url("Enrollment.svc"),
            authentication_service_url: Some(state.config.service_url("Authenticate.svc")),
        };
        Ok(response.to_envelope(ctx))
    })
}

pub async fn policy(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond::<PolicyRequest, _>("policy", &uri, &headers, &body, |_, ctx| {
        let response = PolicyResponse::new(&state.config.policy_id, &state.config.policy_name);
        Ok(response.to_envelope(ctx))
    })
}

pub async fn enrollment(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // CSR verification and signing are CPU bound
    let task = tokio::task::spawn_blocking(move || {
        respond::<EnrollmentRequest, _>("enrollment", &uri, &headers, &body, |envelope, ctx| {
            let response = enroll(&state, envelope)?;
            Ok(response.to_envelope(ctx, Utc::now()))
        })
    });
    match task.await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "enrollment task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Management sessions are not served yet.
pub async fn manage() -> StatusCode {
    StatusCode::OK
}

fn enroll(
    state: &AppState,
    envelope: &Envelope<EnrollmentRequest>,
) -> Result<EnrollmentResponse, Fault> {
    let request = &envelope.body;
    let device_id = request.check()?;
    let principal = authenticate_token(state, envelope.header.security.as_ref())?;

    let csr = request.csr_der().map_err(|e| {
        tracing::warn!(error = %e, "undecodable certificate request");
        Fault::new(FaultCode::MessageFormat, "the certificate request is not valid base64")
    })?;

    let enrollment_type = request.enrollment_type();
    let common_name = match enrollment_type {
        EnrollmentType::Device => device_id,
        EnrollmentType::User => principal.as_str(),
    };
    let issue_request = IssueRequest {
        enrollment_type,
        common_name,
        device_id,
    };
    let bundle =
        mde_pki::issue(&csr, &issue_request, &state.ca, Utc::now()).map_err(issuance_fault)?;
    tracing::info!(
        principal = %principal,
        device_id,
        subject = %bundle.subject,
        serial = %bundle.serial,
        fingerprint = %bundle.leaf_fingerprint,
        store = enrollment_type.store(),
        "issued identity certificate"
    );

    let record = CertificateRecord {
        fingerprint: bundle.leaf_fingerprint.clone(),
        der: bundle.leaf_der.clone(),
        subject: bundle.subject.clone(),
        serial: bundle.serial.clone(),
        device_id: device_id.to_string(),
    };
    if let Err(e) = state.sink.persist(&record) {
        tracing::error!(error = %e, fingerprint = %record.fingerprint, "failed to persist certificate");
    }

    let doc = enrollment_profile(&bundle, device_id, &state.config.management).map_err(|e| {
        tracing::error!(error = %e, "failed to build provisioning profile");
        Fault::from_error(&e)
    })?;
    EnrollmentResponse::new(&doc).map_err(|e| {
        tracing::error!(error = %e, "failed to serialize provisioning profile");
        Fault::from_error(&e)
    })
}

/**
    Resolve the header token to the principal it was issued for.
*/
fn authenticate_token(state: &AppState, token: Option<&SecurityToken>) -> Result<String, Fault> {
    let Some(token) = token else {
        return Err(Fault::new(
            FaultCode::InvalidSecurity,
            "the request carries no security token",
        ));
    };
    let rejected = || Fault::new(FaultCode::Authentication, "the security token was not accepted");

    let SecurityToken::Binary { kind, .. } = token else {
        tracing::warn!("username tokens are not accepted");
        return Err(rejected());
    };
    if *kind == TokenKind::Jwt {
        tracing::warn!("Azure AD tokens are not accepted");
        return Err(Fault::new(
            FaultCode::Authorization,
            "this server only accepts tokens from its own federated login",
        ));
    }
    let raw = token.binary_value().map_err(|e| {
        tracing::warn!(error = %e, "undecodable security token");
        rejected()
    })?;
    let Ok(jwt) = String::from_utf8(raw) else {
        tracing::warn!(?kind, "security token is not text");
        return Err(rejected());
    };
    state.tokens.verify(&jwt).map_err(|e| {
        tracing::warn!(?kind, error = %e, "security token rejected");
        rejected()
    })
}

fn issuance_fault(err: IssuanceError) -> Fault {
    match err {
        IssuanceError::MalformedCsr(_)
        | IssuanceError::MissingPublicKey
        | IssuanceError::InvalidSubject(_) => {
            tracing::warn!(error = %err, "certificate request rejected");
            Fault::new(
                FaultCode::CertificateRequest,
                "the certificate request could not be processed",
            )
        }
        IssuanceError::SigningFailure(_) => {
            tracing::error!(error = %err, "certificate signing failed");
            Fault::new(FaultCode::EnrollmentServer, "the certificate could not be issued")
        }
    }
}
