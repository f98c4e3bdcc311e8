use chrono::{DateTime, Duration, SecondsFormat, Utc};
use data_encoding::BASE64;

use mde_pki::EnrollmentType;
use mde_xml::{Cursor, Decoder, Element, Namespace};

use crate::envelope::{
    BASE64_ENCODING, CorrelationContext, SoapRequest, decode_base64, must_understand,
    response_envelope,
};
use crate::error::ProtocolResult;
use crate::fault::{Fault, FaultCode, ServiceErrorType};
use crate::wap::ProvisioningDoc;

pub const ENROLLMENT_ACTION: &str = "http://schemas.microsoft.com/windows/pki/2009/01/enrollment/RST/wstep";
pub const ENROLLMENT_RESPONSE_ACTION: &str =
    "http://schemas.microsoft.com/windows/pki/2009/01/enrollment/RSTRC/wstep";

const DEVICE_ENROLLMENT_TOKEN: &str =
    "http://schemas.microsoft.com/5.0.0.0/ConfigurationManager/Enrollment/DeviceEnrollmentToken";
const PROVISION_DOC_TOKEN: &str =
    "http://schemas.microsoft.com/5.0.0.0/ConfigurationManager/Enrollment/DeviceEnrollmentProvisionDoc";
const ISSUE_REQUEST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Issue";
const RENEW_REQUEST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Renew";
const PKCS10_TOKEN: &str = "http://schemas.microsoft.com/windows/pki/2009/01/enrollment#PKCS10";
const PKCS7_TOKEN: &str = "http://schemas.microsoft.com/windows/pki/2009/01/enrollment#PKCS7";

/// Only device type this server manages.
pub const WINDOWS_DEVICE_TYPE: &str = "CIMClient_Windows";

/// Lifetime of the WS-Security timestamp on responses.
const TIMESTAMP_LIFETIME_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Issue,
    Renew,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateTokenType {
    Pkcs10,
    Pkcs7,
}

const REQUEST_TYPES: [(&str, RequestType); 2] = [
    (ISSUE_REQUEST, RequestType::Issue),
    (RENEW_REQUEST, RequestType::Renew),
];

const TOKEN_TYPES: [(&str, CertificateTokenType); 2] = [
    (PKCS10_TOKEN, CertificateTokenType::Pkcs10),
    (PKCS7_TOKEN, CertificateTokenType::Pkcs7),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextItem {
    pub name: String,
    pub value: String,
}

/**
    Body of the `RST/wstep` request: a certificate request plus
    the device's description of itself.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub request_type: RequestType,
    pub token_type: CertificateTokenType,
    /// Base64 certificate request as sent, possibly line wrapped.
    pub csr: String,
    pub context: Vec<ContextItem>,
}

impl EnrollmentRequest {
    /**
        Value of the first context item called `name`.
    */
    pub fn context(&self, name: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.value.as_str())
    }

    pub fn device_id(&self) -> Option<&str> {
        self.context("DeviceID").filter(|id| !id.is_empty())
    }

    /**
        `Device` enrolls into the machine store, anything else
        (including `Full`) is a user enrollment.
    */
    pub fn enrollment_type(&self) -> EnrollmentType {
        EnrollmentType::from_context(self.context("EnrollmentType").unwrap_or_default())
    }

    pub fn csr_der(&self) -> ProtocolResult<Vec<u8>> {
        decode_base64(&self.csr, "wsse:BinarySecurityToken")
    }

    /**
        Reject requests this server cannot act on before any
        certificate is issued. Returns the validated DeviceID.
    */
    pub fn check(&self) -> Result<&str, Fault> {
        if self.request_type == RequestType::Renew {
            return Err(Fault::new(
                FaultCode::MessageFormat,
                "certificate renewal is not supported",
            ));
        }
        if self.token_type != CertificateTokenType::Pkcs10 {
            return Err(Fault::new(
                FaultCode::MessageFormat,
                "the binary security token type is not supported",
            ));
        }
        let Some(device_id) = self.device_id() else {
            return Err(Fault::new(FaultCode::MessageFormat, "the enrollment data is incomplete")
                .with_error_type(ServiceErrorType::InvalidEnrollmentData));
        };
        match self.context("DeviceType") {
            Some(device_type) if device_type != WINDOWS_DEVICE_TYPE => Err(Fault::new(
                FaultCode::MessageFormat,
                "the device is not supported by this management server",
            )
            .with_error_type(ServiceErrorType::DeviceNotSupported)),
            _ => Ok(device_id),
        }
    }
}

impl SoapRequest for EnrollmentRequest {
    const ACTION: &'static str = ENROLLMENT_ACTION;
    const RESPONSE_ACTION: &'static str = ENROLLMENT_RESPONSE_ACTION;
    const NAMESPACES: &'static [Namespace] = &[
        Namespace::WsSecurityUtility,
        Namespace::WsSecurity,
        Namespace::WsTrust,
        Namespace::Authorization,
    ];

    fn decode_body(de: &mut Decoder, body: &Cursor<'_>) -> Self {
        let mut request = Self {
            request_type: RequestType::Issue,
            token_type: CertificateTokenType::Pkcs10,
            csr: String::new(),
            context: Vec::new(),
        };
        let Some(rst) = de.required(body, Namespace::WsTrust, "RequestSecurityToken") else {
            return request;
        };

        de.literal(&rst, Namespace::WsTrust, "TokenType", DEVICE_ENROLLMENT_TOKEN);
        if let Some(request_type) = de.required(&rst, Namespace::WsTrust, "RequestType") {
            request.request_type = de
                .one_of(&request_type, &REQUEST_TYPES)
                .unwrap_or(RequestType::Issue);
        }

        if let Some(token) = de.required(&rst, Namespace::WsSecurity, "BinarySecurityToken") {
            request.token_type = de
                .attribute_one_of(&token, None, "ValueType", &TOKEN_TYPES)
                .unwrap_or(CertificateTokenType::Pkcs10);
            de.literal_attribute(&token, None, "EncodingType", BASE64_ENCODING);
            request.csr = token.text();
        }

        if let Some(additional) = de.required(&rst, Namespace::Authorization, "AdditionalContext") {
            for item in de.array(&additional, Namespace::Authorization, "ContextItem") {
                let name = de.attribute(&item, None, "Name").unwrap_or_default();
                let value = de.string(&item, Namespace::Authorization, "Value");
                request.context.push(ContextItem { name, value });
            }
        }

        request
    }
}

/**
    `RSTRC/wstep` response carrying the provisioning document.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentResponse {
    /// Base64 of the serialized `wap-provisioningdoc`.
    pub provisioning_doc: String,
}

impl EnrollmentResponse {
    pub fn new(doc: &ProvisioningDoc) -> ProtocolResult<Self> {
        let xml = doc.to_xml()?;
        Ok(Self {
            provisioning_doc: BASE64.encode(xml.as_bytes()),
        })
    }

    pub fn to_envelope(&self, ctx: &CorrelationContext, now: DateTime<Utc>) -> Element {
        let u = Namespace::WsSecurityUtility;
        let timestamp = |at: DateTime<Utc>| at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let security = must_understand(
            Element::new("o:Security").attr("xmlns:o", Namespace::WsSecurity.uri()),
        )
        .child(
            Element::in_ns(u, "Timestamp")
                .attr(u.qualify("Id"), "_0")
                .child(Element::in_ns(u, "Created").text(timestamp(now)))
                .child(Element::in_ns(u, "Expires").text(timestamp(now + Duration::minutes(TIMESTAMP_LIFETIME_MINUTES)))),
        );

        let enrollment_ns = |local: &str| Element::new(local).declare(Namespace::Enrollment);
        let token = Element::new("BinarySecurityToken")
            .attr("xmlns", Namespace::WsSecurity.uri())
            .attr("ValueType", PROVISION_DOC_TOKEN)
            .attr("EncodingType", BASE64_ENCODING)
            .text(&self.provisioning_doc);

        let response = Element::new("RequestSecurityTokenResponse")
            .child(Element::new("TokenType").text(DEVICE_ENROLLMENT_TOKEN))
            .child(enrollment_ns("DispositionMessage"))
            .child(Element::new("RequestedSecurityToken").child(token))
            .child(enrollment_ns("RequestID").text("0"));

        let body = Element::in_ns(Namespace::Soap, "Body").child(
            Element::new("RequestSecurityTokenResponseCollection")
                .attr("xmlns", Namespace::WsTrust.uri())
                .child(response),
        );
        response_envelope(ENROLLMENT_RESPONSE_ACTION, ctx, &[u], Some(security), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::tests::MESSAGE_ID;
    use crate::envelope::{SecurityToken, TokenKind, decode_request};
    use crate::error::ProtocolError;
    use chrono::TimeZone;

    const REQUEST: &str = include_str!("../testdata/enrollment.xml");

    fn decode(xml: &str) -> EnrollmentRequest {
        decode_request::<EnrollmentRequest>(xml).unwrap().body
    }

    #[test]
    fn decodes_windows_request() {
        let env = decode_request::<EnrollmentRequest>(REQUEST).unwrap();
        assert!(matches!(
            env.header.security,
            Some(SecurityToken::Binary { kind: TokenKind::DeviceEnrollmentUserToken, .. })
        ));

        let req = env.body;
        assert_eq!(req.request_type, RequestType::Issue);
        assert_eq!(req.token_type, CertificateTokenType::Pkcs10);
        assert_eq!(req.device_id(), Some("B1C43CD0-1624-5FBB-8E54-34CF17DFD3A1"));
        assert_eq!(req.context("DeviceType"), Some(WINDOWS_DEVICE_TYPE));
        assert_eq!(req.context("UXInitiated"), Some("true"));
        assert_eq!(req.enrollment_type(), EnrollmentType::User);
        assert_eq!(req.check(), Ok("B1C43CD0-1624-5FBB-8E54-34CF17DFD3A1"));
    }

    #[test]
    fn wrapped_csr_decodes() {
        let der = decode(REQUEST).csr_der().unwrap();
        // SEQUENCE with a two byte length
        assert_eq!(&der[..2], &[0x30, 0x82]);
    }

    #[test]
    fn device_enrollment_type() {
        let xml = REQUEST.replace(
            r#"<ac:ContextItem Name="EnrollmentType"><ac:Value>Full</ac:Value>"#,
            r#"<ac:ContextItem Name="EnrollmentType"><ac:Value>Device</ac:Value>"#,
        );
        assert_eq!(decode(&xml).enrollment_type(), EnrollmentType::Device);
    }

    #[test]
    fn missing_enrollment_type_is_user() {
        let mut req = decode(REQUEST);
        req.context.retain(|item| item.name != "EnrollmentType");
        assert_eq!(req.enrollment_type(), EnrollmentType::User);
    }

    #[test]
    fn renewals_are_rejected() {
        let xml = REQUEST.replace("200512/Issue", "200512/Renew");
        let fault = decode(&xml).check().unwrap_err();
        assert_eq!(fault.code, FaultCode::MessageFormat);
    }

    #[test]
    fn missing_device_id() {
        let mut req = decode(REQUEST);
        req.context.retain(|item| item.name != "DeviceID");
        let fault = req.check().unwrap_err();
        assert_eq!(fault.error_type, Some(ServiceErrorType::InvalidEnrollmentData));
    }

    #[test]
    fn foreign_device_type() {
        let xml = REQUEST.replace(
            "<ac:Value>CIMClient_Windows</ac:Value>",
            "<ac:Value>CIMClient_Android</ac:Value>",
        );
        let fault = decode(&xml).check().unwrap_err();
        assert_eq!(fault.error_type, Some(ServiceErrorType::DeviceNotSupported));
    }

    #[test]
    fn wrong_token_type_is_an_issue() {
        let xml = REQUEST.replace(
            "Enrollment/DeviceEnrollmentToken</wst:TokenType>",
            "Enrollment/Other</wst:TokenType>",
        );
        let ProtocolError::Validation(issues) = decode_request::<EnrollmentRequest>(&xml).unwrap_err()
        else {
            panic!("expected validation issues");
        };
        assert!(issues.at("wst:RequestSecurityToken.wst:TokenType").is_some());
    }

    #[test]
    fn response_shape() {
        let ctx = CorrelationContext::new(MESSAGE_ID, None);
        let response = EnrollmentResponse {
            provisioning_doc: "UFJPRklMRQ==".into(),
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let xml = mde_xml::to_string(&response.to_envelope(&ctx, now)).unwrap();

        assert!(xml.starts_with(concat!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://www.w3.org/2005/08/addressing" "#,
            r#"xmlns:u="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">"#,
        )));
        assert!(xml.contains(concat!(
            r#"<o:Security xmlns:o="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" s:mustUnderstand="1">"#,
            r#"<u:Timestamp u:Id="_0"><u:Created>2024-03-01T12:00:00.000Z</u:Created>"#,
            "<u:Expires>2024-03-01T12:05:00.000Z</u:Expires></u:Timestamp></o:Security></s:Header>",
        )));
        assert!(xml.contains(concat!(
            r#"<s:Body><RequestSecurityTokenResponseCollection xmlns="http://docs.oasis-open.org/ws-sx/ws-trust/200512">"#,
            "<RequestSecurityTokenResponse>",
            "<TokenType>http://schemas.microsoft.com/5.0.0.0/ConfigurationManager/Enrollment/DeviceEnrollmentToken</TokenType>",
            r#"<DispositionMessage xmlns="http://schemas.microsoft.com/windows/pki/2009/01/enrollment"/>"#,
            "<RequestedSecurityToken>",
            r#"<BinarySecurityToken xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" "#,
            r#"ValueType="http://schemas.microsoft.com/5.0.0.0/ConfigurationManager/Enrollment/DeviceEnrollmentProvisionDoc" "#,
            r#"EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd#base64binary">"#,
            "UFJPRklMRQ==</BinarySecurityToken></RequestedSecurityToken>",
            r#"<RequestID xmlns="http://schemas.microsoft.com/windows/pki/2009/01/enrollment">0</RequestID>"#,
        )));
    }

    #[test]
    fn enrollment_fixture_survives_a_round_trip() {
        crate::envelope::tests::assert_round_trip(REQUEST);
    }
}
