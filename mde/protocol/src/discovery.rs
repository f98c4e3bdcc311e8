use mde_xml::{Cursor, Decoder, Element, Namespace};

use crate::envelope::{CorrelationContext, SoapRequest, response_envelope};

pub const DISCOVER_ACTION: &str =
    "http://schemas.microsoft.com/windows/management/2012/01/enrollment/IDiscoveryService/Discover";
pub const DISCOVER_RESPONSE_ACTION: &str =
    "http://schemas.microsoft.com/windows/management/2012/01/enrollment/IDiscoveryService/DiscoverResponse";

/// Highest enrollment protocol version this server speaks.
pub const ENROLLMENT_VERSION: &str = "5.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    OnPremise,
    Federated,
    Certificate,
}

const AUTH_POLICIES: [(&str, AuthPolicy); 3] = [
    ("OnPremise", AuthPolicy::OnPremise),
    ("Federated", AuthPolicy::Federated),
    ("Certificate", AuthPolicy::Certificate),
];

impl AuthPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnPremise => "OnPremise",
            Self::Federated => "Federated",
            Self::Certificate => "Certificate",
        }
    }
}

/**
    Body of `IDiscoveryService/Discover`.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub email_address: String,
    pub request_version: String,
    pub device_type: Option<String>,
    pub application_version: Option<String>,
    pub os_edition: Option<String>,
    /// Policies the client can handle, in the order it listed them.
    pub auth_policies: Vec<AuthPolicy>,
}

impl DiscoveryRequest {
    pub fn supports(&self, policy: AuthPolicy) -> bool {
        self.auth_policies.contains(&policy)
    }

    /**
        Enrollment version to answer with. Clients asking for an older
        protocol get their own version back, newer ones are capped.
    */
    pub fn negotiated_version(&self) -> String {
        match self.request_version.trim().parse::<f64>() {
            Ok(requested) if requested < 5.0 => self.request_version.trim().to_string(),
            _ => ENROLLMENT_VERSION.to_string(),
        }
    }
}

impl SoapRequest for DiscoveryRequest {
    const ACTION: &'static str = DISCOVER_ACTION;
    const RESPONSE_ACTION: &'static str = DISCOVER_RESPONSE_ACTION;
    const NAMESPACES: &'static [Namespace] = &[];

    fn decode_body(de: &mut Decoder, body: &Cursor<'_>) -> Self {
        let ns = Namespace::Discovery;
        let request = de
            .required(body, ns, "Discover")
            .and_then(|discover| de.required(&discover, ns, "request"));
        let Some(request) = request else {
            return Self::empty();
        };

        let auth_policies = de
            .optional(&request, ns, "AuthPolicies")
            .map(|policies| {
                de.array(&policies, ns, "AuthPolicy")
                    .iter()
                    .filter_map(|policy| de.one_of(policy, &AUTH_POLICIES))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            email_address: de.string(&request, ns, "EmailAddress"),
            request_version: de.string(&request, ns, "RequestVersion"),
            device_type: de.optional_string(&request, ns, "DeviceType"),
            application_version: de.optional_string(&request, ns, "ApplicationVersion"),
            os_edition: de.optional_string(&request, ns, "OSEdition"),
            auth_policies,
        }
    }
}

impl DiscoveryRequest {
    fn empty() -> Self {
        Self {
            email_address: String::new(),
            request_version: String::new(),
            device_type: None,
            application_version: None,
            os_edition: None,
            auth_policies: Vec::new(),
        }
    }
}

/**
    Body of `DiscoverResponse`: where the client goes next.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResponse {
    pub auth_policy: AuthPolicy,
    pub enrollment_version: String,
    pub enrollment_policy_service_url: String,
    pub enrollment_service_url: String,
    /// Only sent for [`AuthPolicy::Federated`].
    pub authentication_service_url: Option<String>,
}

impl DiscoveryResponse {
    pub fn to_envelope(&self, ctx: &CorrelationContext) -> Element {
        let ns = Namespace::Discovery;
        let mut result = Element::in_ns(ns, "DiscoverResult")
            .child(Element::in_ns(ns, "AuthPolicy").text(self.auth_policy.as_str()))
            .child(Element::in_ns(ns, "EnrollmentVersion").text(&self.enrollment_version))
            .child(
                Element::in_ns(ns, "EnrollmentPolicyServiceUrl")
                    .text(&self.enrollment_policy_service_url),
            )
            .child(Element::in_ns(ns, "EnrollmentServiceUrl").text(&self.enrollment_service_url));
        if let (AuthPolicy::Federated, Some(url)) =
            (self.auth_policy, &self.authentication_service_url)
        {
            result.push(Element::in_ns(ns, "AuthenticationServiceUrl").text(url));
        }

        let body = Element::in_ns(Namespace::Soap, "Body").child(
            Element::in_ns(ns, "DiscoverResponse")
                .declare(ns)
                .child(result),
        );
        response_envelope(DISCOVER_RESPONSE_ACTION, ctx, &[], None, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::decode_request;
    use crate::envelope::tests::MESSAGE_ID;
    use crate::error::ProtocolError;

    const REQUEST: &str = include_str!("../testdata/discover.xml");

    fn ctx() -> CorrelationContext {
        CorrelationContext::new(MESSAGE_ID, None)
    }

    #[test]
    fn decodes_windows_request() {
        let env = decode_request::<DiscoveryRequest>(REQUEST).unwrap();
        assert_eq!(env.header.message_id, MESSAGE_ID);
        let req = env.body;
        assert_eq!(req.email_address, "user@example.com");
        assert_eq!(req.request_version, "6.0");
        assert_eq!(req.device_type.as_deref(), Some("CIMClient_Windows"));
        assert_eq!(req.application_version.as_deref(), Some("10.0.22621.3155"));
        assert_eq!(req.os_edition.as_deref(), Some("101"));
        assert_eq!(req.auth_policies, [AuthPolicy::OnPremise, AuthPolicy::Federated]);
        assert!(req.supports(AuthPolicy::Federated));
        assert!(!req.supports(AuthPolicy::Certificate));
    }

    #[test]
    fn missing_email_is_reported_with_path() {
        let xml = REQUEST.replace("<EmailAddress>user@example.com</EmailAddress>", "");
        let ProtocolError::Validation(issues) =
            decode_request::<DiscoveryRequest>(&xml).unwrap_err()
        else {
            panic!("expected validation issues");
        };
        assert_eq!(issues.len(), 1);
        assert!(issues.at("Discover.request.EmailAddress").is_some());
    }

    #[test]
    fn single_auth_policy_is_a_list() {
        let xml = REQUEST.replace("<AuthPolicy>OnPremise</AuthPolicy>", "");
        let env = decode_request::<DiscoveryRequest>(&xml).unwrap();
        assert_eq!(env.body.auth_policies, [AuthPolicy::Federated]);
    }

    #[test]
    fn unknown_auth_policy_is_an_issue() {
        let xml = REQUEST.replace("<AuthPolicy>OnPremise</AuthPolicy>", "<AuthPolicy>Kerberos</AuthPolicy>");
        assert!(matches!(
            decode_request::<DiscoveryRequest>(&xml),
            Err(ProtocolError::Validation(_))
        ));
    }

    #[test]
    fn foreign_action_is_rejected() {
        let xml = REQUEST.replace(
            "IDiscoveryService/Discover<",
            "IDiscoveryService/Other<",
        );
        assert!(matches!(
            decode_request::<DiscoveryRequest>(&xml),
            Err(ProtocolError::ActionMismatch { .. })
        ));
    }

    #[test]
    fn version_negotiation() {
        let mut req = DiscoveryRequest::empty();
        req.request_version = "6.0".into();
        assert_eq!(req.negotiated_version(), "5.0");
        req.request_version = "4.0".into();
        assert_eq!(req.negotiated_version(), "4.0");
        req.request_version = "garbage".into();
        assert_eq!(req.negotiated_version(), "5.0");
    }

    fn response(auth_policy: AuthPolicy) -> DiscoveryResponse {
        DiscoveryResponse {
            auth_policy,
            enrollment_version: "5.0".into(),
            enrollment_policy_service_url: "https://e.example.com/EnrollmentServer/Policy.svc".into(),
            enrollment_service_url: "https://e.example.com/EnrollmentServer/Enrollment.svc".into(),
            authentication_service_url: Some(
                "https://e.example.com/EnrollmentServer/Authenticate.svc".into(),
            ),
        }
    }

    #[test]
    fn federated_response_shape() {
        let ctx = ctx();
        let env = response(AuthPolicy::Federated).to_envelope(&ctx);
        let xml = mde_xml::to_string(&env).unwrap();
        assert!(xml.contains(&format!(
            "<a:Action s:mustUnderstand=\"1\">{DISCOVER_RESPONSE_ACTION}</a:Action>"
        )));
        assert!(xml.contains(&format!("<a:RelatesTo>{MESSAGE_ID}</a:RelatesTo>")));
        assert!(xml.contains(concat!(
            "<s:Body><DiscoverResponse xmlns=\"http://schemas.microsoft.com/windows/management/2012/01/enrollment\">",
            "<DiscoverResult><AuthPolicy>Federated</AuthPolicy><EnrollmentVersion>5.0</EnrollmentVersion>",
            "<EnrollmentPolicyServiceUrl>https://e.example.com/EnrollmentServer/Policy.svc</EnrollmentPolicyServiceUrl>",
            "<EnrollmentServiceUrl>https://e.example.com/EnrollmentServer/Enrollment.svc</EnrollmentServiceUrl>",
            "<AuthenticationServiceUrl>https://e.example.com/EnrollmentServer/Authenticate.svc</AuthenticationServiceUrl>",
            "</DiscoverResult></DiscoverResponse></s:Body>"
        )));
    }

    #[test]
    fn authentication_url_only_when_federated() {
        let env = response(AuthPolicy::OnPremise).to_envelope(&ctx());
        let xml = mde_xml::to_string(&env).unwrap();
        assert!(!xml.contains("AuthenticationServiceUrl"));
    }

    #[test]
    fn response_reparses() {
        let ctx = ctx();
        let xml = mde_xml::to_string(&response(AuthPolicy::Federated).to_envelope(&ctx)).unwrap();
        let doc = mde_xml::parse(&xml).unwrap();
        let relates = doc.find_path(&["Header", "RelatesTo"]).unwrap();
        assert_eq!(relates.text_content(), MESSAGE_ID);
        let activity = doc.find_path(&["Header", "ActivityId"]).unwrap();
        assert_eq!(activity.text_content(), ctx.activity_id);
        assert_eq!(activity.attribute("CorrelationId"), Some(ctx.correlation_id.as_str()));
    }

    #[test]
    fn discover_fixture_survives_a_round_trip() {
        crate::envelope::tests::assert_round_trip(REQUEST);
    }
}
