/*!
    Message catalog for the Windows enrollment services.

    Each request type implements [`SoapRequest`] and is decoded with
    [`decode_request`]. Responses and faults build a complete envelope
    tied to the request through a [`CorrelationContext`].
*/

mod discovery;
mod enrollment;
mod envelope;
mod error;
mod fault;
mod policy;

pub mod wap;

pub use discovery::{
    AuthPolicy, DISCOVER_ACTION, DISCOVER_RESPONSE_ACTION, DiscoveryRequest, DiscoveryResponse,
    ENROLLMENT_VERSION,
};
pub use enrollment::{
    CertificateTokenType, ContextItem, ENROLLMENT_ACTION, ENROLLMENT_RESPONSE_ACTION,
    EnrollmentRequest, EnrollmentResponse, RequestType, WINDOWS_DEVICE_TYPE,
};
pub use envelope::{
    ANONYMOUS_ADDRESS, BASE64_ENCODING, CorrelationContext, Envelope, RequestHeader,
    SecurityToken, SoapRequest, TokenKind, decode_request,
};
pub use error::{ProtocolError, ProtocolResult};
pub use fault::{Fault, FaultCode, ServiceErrorType};
pub use policy::{
    GET_POLICIES_ACTION, GET_POLICIES_RESPONSE_ACTION, MINIMAL_KEY_LENGTH, PolicyRequest,
    PolicyResponse, SHA256_OID,
};
