use mde_xml::{Cursor, Decoder, Element, Namespace};

use crate::envelope::{CorrelationContext, SoapRequest, response_envelope};

pub const GET_POLICIES_ACTION: &str =
    "http://schemas.microsoft.com/windows/pki/2009/01/enrollmentpolicy/IPolicy/GetPolicies";
pub const GET_POLICIES_RESPONSE_ACTION: &str =
    "http://schemas.microsoft.com/windows/pki/2009/01/enrollmentpolicy/IPolicy/GetPoliciesResponse";

pub const MINIMAL_KEY_LENGTH: u32 = 4096;
pub const SHA256_OID: &str = "2.16.840.1.101.3.4.2.1";
const SHA256_OID_NAME: &str = "szOID_OIWSEC_SHA256";

/**
    Body of `IPolicy/GetPolicies`. The client block only carries
    informational TPM details.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRequest {
    pub tpm_manufacturer: Option<String>,
    pub tpm_firmware_version: Option<String>,
}

impl SoapRequest for PolicyRequest {
    const ACTION: &'static str = GET_POLICIES_ACTION;
    const RESPONSE_ACTION: &'static str = GET_POLICIES_RESPONSE_ACTION;
    const NAMESPACES: &'static [Namespace] = &[
        Namespace::WsSecurityUtility,
        Namespace::WsSecurity,
        Namespace::WsTrust,
        Namespace::Authorization,
    ];

    fn decode_body(de: &mut Decoder, body: &Cursor<'_>) -> Self {
        let ns = Namespace::EnrollmentPolicy;
        let Some(get_policies) = de.required(body, ns, "GetPolicies") else {
            return Self::default();
        };
        let Some(client) = de.required(&get_policies, ns, "client") else {
            return Self::default();
        };

        // lastUpdate, preferredLanguage and requestFilter are always nil in practice.
        Self {
            tpm_manufacturer: de.optional_string(&client, ns, "TPMManufacturer"),
            tpm_firmware_version: de.optional_string(&client, ns, "TPMFirmwareVersion"),
        }
    }
}

/**
    The single certificate policy handed to every device.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResponse {
    pub policy_id: String,
    pub friendly_name: String,
    pub minimal_key_length: u32,
}

impl PolicyResponse {
    pub fn new(policy_id: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            friendly_name: friendly_name.into(),
            minimal_key_length: MINIMAL_KEY_LENGTH,
        }
    }

    pub fn to_envelope(&self, ctx: &CorrelationContext) -> Element {
        let ns = Namespace::EnrollmentPolicy;
        let el = |local: &str| Element::in_ns(ns, local);
        let nil = |local: &str| Element::in_ns(ns, local).nil();

        let private_key_attributes = el("privateKeyAttributes")
            .child(el("minimalKeyLength").text(self.minimal_key_length.to_string()))
            .child(nil("keySpec"))
            .child(nil("keyUsageProperty"))
            .child(nil("permissions"))
            .child(nil("algorithmOIDReference"))
            .child(nil("cryptoProviders"));

        let attributes = el("attributes")
            .child(el("policySchema").text("3"))
            .child(private_key_attributes)
            .child(nil("supersededPolicies"))
            .child(nil("privateKeyFlags"))
            .child(nil("subjectNameFlags"))
            .child(nil("enrollmentFlags"))
            .child(nil("generalFlags"))
            .child(el("hashAlgorithmOIDReference").text("0"))
            .child(nil("rARequirements"))
            .child(nil("keyArchivalAttributes"))
            .child(nil("extensions"));

        let policy = el("policy")
            .child(el("policyOIDReference").text("0"))
            .child(nil("cAs"))
            .child(attributes);

        let response = el("response")
            .child(el("policyID").text(&self.policy_id))
            .child(el("policyFriendlyName").text(&self.friendly_name))
            .child(nil("nextUpdateHours"))
            .child(nil("policiesNotChanged"))
            .child(el("policies").child(policy));

        let oids = el("oIDs")
            .child(el("policyOIDReference").text("0"))
            .child(el("defaultName").text(SHA256_OID_NAME))
            .child(el("group").text("2"))
            .child(el("value").text(SHA256_OID));

        let body = Element::in_ns(Namespace::Soap, "Body")
            .declare(Namespace::XmlSchemaInstance)
            .child(
                el("GetPoliciesResponse")
                    .declare(ns)
                    .child(response)
                    .child(el("cAs"))
                    .child(oids),
            );
        response_envelope(GET_POLICIES_RESPONSE_ACTION, ctx, &[], None, body)
    }
}
