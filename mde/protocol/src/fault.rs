use mde_xml::{Element, Namespace};

use crate::envelope::{CorrelationContext, response_envelope};
use crate::error::ProtocolError;

/**
    Fault subcodes understood by the Windows enrollment client.

    Each maps to the `0x8018xxxx` error the client shows in its event log.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    MessageFormat,
    Authentication,
    Authorization,
    CertificateRequest,
    EnrollmentServer,
    InternalServiceFault,
    InvalidSecurity,
    ActionMismatch,
    EndpointUnavailable,
}

impl FaultCode {
    pub const fn subcode(self) -> &'static str {
        match self {
            Self::MessageFormat => "s:MessageFormat",
            Self::Authentication => "s:Authentication",
            Self::Authorization => "s:Authorization",
            Self::CertificateRequest => "s:CertificateRequest",
            Self::EnrollmentServer => "s:EnrollmentServer",
            Self::InternalServiceFault => "a:InternalServiceFault",
            Self::InvalidSecurity => "a:InvalidSecurity",
            Self::ActionMismatch => "a:ActionMismatch",
            Self::EndpointUnavailable => "a:EndpointUnavailable",
        }
    }

    pub const fn hresult(self) -> u32 {
        match self {
            Self::MessageFormat => 0x8018_0001,
            Self::Authentication => 0x8018_0002,
            Self::Authorization => 0x8018_0003,
            Self::CertificateRequest => 0x8018_0004,
            Self::EnrollmentServer => 0x8018_0005,
            Self::InternalServiceFault => 0x8018_0006,
            Self::InvalidSecurity => 0x8018_0007,
            Self::ActionMismatch | Self::EndpointUnavailable => 0x8018_0008,
        }
    }

    /**
        Whether the server, rather than the client, is at fault.
    */
    pub const fn is_receiver(self) -> bool {
        matches!(self, Self::EnrollmentServer | Self::InternalServiceFault)
    }

    pub const fn causer(self) -> &'static str {
        if self.is_receiver() {
            "s:Receiver"
        } else {
            "s:Sender"
        }
    }

    pub const fn http_status(self) -> u16 {
        if self.is_receiver() { 500 } else { 400 }
    }
}

/**
    `ErrorType` values with a dedicated error page on the client.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorType {
    InvalidEnrollmentData,
    DeviceNotSupported,
}

impl ServiceErrorType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEnrollmentData => "InvalidEnrollmentData",
            Self::DeviceNotSupported => "DeviceNotSupported",
        }
    }
}

/**
    A SOAP 1.2 fault as returned by every enrollment endpoint.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: FaultCode,
    /// Shown to the user and written to the device management log.
    pub reason: String,
    pub error_type: Option<ServiceErrorType>,
}

impl Fault {
    pub fn new(code: FaultCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            error_type: None,
        }
    }

    pub fn with_error_type(mut self, error_type: ServiceErrorType) -> Self {
        self.error_type = Some(error_type);
        self
    }

    /**
        The fault sent back for a request that failed to decode.
        Validation details stay in the server log.
    */
    pub fn from_error(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::ActionMismatch { .. } => Self::new(
                FaultCode::ActionMismatch,
                "the request's action is not supported by the endpoint",
            ),
            ProtocolError::Xml(_) | ProtocolError::Validation(_) => {
                Self::new(FaultCode::MessageFormat, "the request could not be parsed")
            }
            ProtocolError::InvalidBase64(_) => Self::new(
                FaultCode::MessageFormat,
                "the binary security token encoding is not supported",
            ),
            ProtocolError::InvalidProfile { .. } => Self::new(
                FaultCode::InternalServiceFault,
                "the provisioning profile could not be built",
            ),
        }
    }

    pub fn to_envelope(&self, action: &str, ctx: &CorrelationContext) -> Element {
        let mut subcode = Element::in_ns(Namespace::Soap, "Value");
        if self.code.subcode().starts_with("a:") {
            subcode = subcode.declare(Namespace::Dispatcher);
        }
        let code = Element::in_ns(Namespace::Soap, "Code")
            .child(Element::in_ns(Namespace::Soap, "Value").text(self.code.causer()))
            .child(
                Element::in_ns(Namespace::Soap, "Subcode")
                    .child(subcode.text(self.code.subcode())),
            );

        let reason = Element::in_ns(Namespace::Soap, "Reason").child(
            Element::in_ns(Namespace::Soap, "Text")
                .attr("xml:lang", "en-US")
                .text(&self.reason),
        );

        let mut detail = Element::new("DeviceEnrollmentServiceError").declare(Namespace::Enrollment);
        if let Some(error_type) = self.error_type {
            detail.push(Element::new("ErrorType").text(error_type.as_str()));
            detail.push(Element::new("Message").text(&self.reason));
        }
        detail.push(Element::new("TraceId").text(&ctx.activity_id));

        let fault = Element::in_ns(Namespace::Soap, "Fault")
            .child(code)
            .child(reason)
            .child(Element::in_ns(Namespace::Soap, "Detail").child(detail));
        let body = Element::in_ns(Namespace::Soap, "Body").child(fault);
        response_envelope(action, ctx, &[], None, body)
    }
}
