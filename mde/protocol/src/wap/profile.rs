use data_encoding::BASE64;
use serde_json::{Value, json};

use mde_pki::IssuedCertificateBundle;

use super::ProvisioningDoc;
use crate::error::ProtocolResult;

const W7_APPID: &str = "w7";
const SYNCML_ENCODING: &str = "application/vnd.syncml.dm+xml";
const SYNC_APPLICATION_VERSION: &str = "5.0";
const KEY_CONTAINER_NAME: &str = "ConfigMgrEnrollment";

/**
    How often the management client polls between sessions.
    Intervals are in minutes.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub first_retry_interval: u32,
    pub first_retries: u32,
    pub second_retry_interval: u32,
    pub second_retries: u32,
    pub remaining_retry_interval: u32,
    /// Zero means retry forever.
    pub remaining_retries: u32,
    pub poll_on_login: bool,
    pub all_users_poll_on_first_login: bool,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            first_retry_interval: 3,
            first_retries: 5,
            second_retry_interval: 15,
            second_retries: 8,
            remaining_retry_interval: 480,
            remaining_retries: 0,
            poll_on_login: true,
            all_users_poll_on_first_login: true,
        }
    }
}

impl PollSchedule {
    fn to_tree(self) -> Value {
        let int = |value: u32| json!({ "type": "integer", "value": value });
        let flag = |value: bool| json!({ "type": "boolean", "value": value });
        json!({
            "IntervalForFirstSetOfRetries": int(self.first_retry_interval),
            "NumberOfFirstRetries": int(self.first_retries),
            "IntervalForSecondSetOfRetries": int(self.second_retry_interval),
            "NumberOfSecondRetries": int(self.second_retries),
            "IntervalForRemainingScheduledRetries": int(self.remaining_retry_interval),
            "NumberOfRemainingScheduledRetries": int(self.remaining_retries),
            "PollOnLogin": flag(self.poll_on_login),
            "AllUsersPollOnFirstLogin": flag(self.all_users_poll_on_first_login),
        })
    }
}

/**
    How the management client and server authenticate each other
    inside an OMA-DM session.
*/
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthType {
    Basic,
    #[default]
    Digest,
}

impl AuthType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "BASIC",
            Self::Digest => "DIGEST",
        }
    }
}

/**
    The management server the enrolled device will talk to.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementEndpoint {
    /// Full URL of the OMA-DM endpoint.
    pub address: String,
    pub provider_id: String,
    pub server_name: String,
    pub auth_type: AuthType,
    pub poll: PollSchedule,
}

/**
    Build the provisioning document that installs the issued
    certificates and points the device at its management server.
*/
pub fn enrollment_profile(
    bundle: &IssuedCertificateBundle,
    device_id: &str,
    endpoint: &ManagementEndpoint,
) -> ProtocolResult<ProvisioningDoc> {
    let store = bundle.enrollment_type.store();
    let search_criteria = format!(
        "Subject={}&Stores=MY%5C{store}",
        encode_uri_component(&bundle.subject)
    );

    let client_auth = json!({
        "AAUTHLEVEL": "CLIENT",
        "AAUTHTYPE": endpoint.auth_type.as_str(),
        "AAUTHSECRET": "dummy",
        "AAUTHDATA": "nonce",
    });
    let server_auth = json!({
        "AAUTHLEVEL": "APPSRV",
        "AAUTHTYPE": endpoint.auth_type.as_str(),
        "AAUTHNAME": "dummy",
        "AAUTHSECRET": "dummy",
        "AAUTHDATA": "nonce",
    });

    let tree = json!({
        "CertificateStore": {
            "Root": {
                "System": {
                    (bundle.root_fingerprint.as_str()): {
                        "EncodedCertificate": BASE64.encode(&bundle.root_der),
                    }
                }
            },
            "My": {
                (store): {
                    (bundle.leaf_fingerprint.as_str()): {
                        "EncodedCertificate": BASE64.encode(&bundle.leaf_der),
                    },
                    "PrivateKeyContainer": {
                        "KeySpec": 2,
                        "ContainerName": KEY_CONTAINER_NAME,
                        "ProviderType": 1,
                    }
                }
            }
        },
        "APPLICATION": {
            "APPID": W7_APPID,
            "PROVIDER-ID": endpoint.provider_id,
            "NAME": endpoint.server_name,
            "ADDR": endpoint.address,
            "ROLE": "4294967295",
            "BACKCOMPATRETRYDISABLED": null,
            "CONNRETRYFREQ": 6,
            "DEFAULTENCODING": SYNCML_ENCODING,
            "INITIALBACKOFFTIME": 30000,
            "MAXBACKOFFTIME": 120000,
            "SSLCLIENTCERTSEARCHCRITERIA": search_criteria,
            "APPAUTH": [client_auth, server_auth],
        },
        "DMClient": {
            "Provider": {
                (endpoint.provider_id.as_str()): {
                    "EntDMID": { "type": "string", "value": device_id },
                    "SyncApplicationVersion": { "type": "string", "value": SYNC_APPLICATION_VERSION },
                    "Poll": endpoint.poll.to_tree(),
                }
            }
        }
    });

    ProvisioningDoc::from_tree(&tree)
}

/**
    Percent-encode the way `encodeURIComponent` does for the characters
    that appear in certificate subjects. Spaces become `%20`, not `+`.
*/
fn encode_uri_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wap::Datatype;
    use mde_pki::EnrollmentType;

    fn bundle(enrollment_type: EnrollmentType) -> IssuedCertificateBundle {
        IssuedCertificateBundle {
            root_fingerprint: "AA11".into(),
            root_der: vec![1, 2, 3],
            leaf_fingerprint: "BB22".into(),
            leaf_der: vec![4, 5, 6],
            subject: "CN=alice@example.com".into(),
            serial: "01".into(),
            enrollment_type,
        }
    }

    fn endpoint() -> ManagementEndpoint {
        ManagementEndpoint {
            address: "https://manage.example.com/ManagementServer/Manage.svc".into(),
            provider_id: "DEMO MDM".into(),
            server_name: "Windows MDM Demo Server".into(),
            auth_type: AuthType::Digest,
            poll: PollSchedule::default(),
        }
    }

    fn value<'a>(doc: &'a ProvisioningDoc, path: &[&str], parm: &str) -> Option<&'a str> {
        doc.find(path)?.parm(parm)?.value.as_deref()
    }

    #[test]
    fn installs_both_certificates() {
        let doc = enrollment_profile(&bundle(EnrollmentType::User), "DEV-1", &endpoint()).unwrap();
        assert_eq!(
            value(&doc, &["CertificateStore", "Root", "System", "AA11"], "EncodedCertificate"),
            Some("AQID")
        );
        assert_eq!(
            value(&doc, &["CertificateStore", "My", "User", "BB22"], "EncodedCertificate"),
            Some("BAUG")
        );
        assert_eq!(
            value(&doc, &["CertificateStore", "My", "User", "PrivateKeyContainer"], "ContainerName"),
            Some("ConfigMgrEnrollment")
        );
    }

    #[test]
    fn device_enrollments_use_the_device_store() {
        let doc = enrollment_profile(&bundle(EnrollmentType::Device), "DEV-1", &endpoint()).unwrap();
        assert!(doc.find(&["CertificateStore", "My", "Device", "BB22"]).is_some());
        assert!(doc.find(&["CertificateStore", "My", "User"]).is_none());
        assert_eq!(
            value(&doc, &["APPLICATION"], "SSLCLIENTCERTSEARCHCRITERIA"),
            Some("Subject=CN%3Dalice%40example.com&Stores=MY%5CDevice")
        );
    }

    #[test]
    fn application_points_at_the_management_server() {
        let doc = enrollment_profile(&bundle(EnrollmentType::User), "DEV-1", &endpoint()).unwrap();
        let app = doc.find(&["APPLICATION"]).unwrap();
        let names: Vec<_> = app.parms.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "APPID",
                "PROVIDER-ID",
                "NAME",
                "ADDR",
                "ROLE",
                "BACKCOMPATRETRYDISABLED",
                "CONNRETRYFREQ",
                "DEFAULTENCODING",
                "INITIALBACKOFFTIME",
                "MAXBACKOFFTIME",
                "SSLCLIENTCERTSEARCHCRITERIA",
            ]
        );
        assert_eq!(
            app.parm("ADDR").and_then(|p| p.value.as_deref()),
            Some("https://manage.example.com/ManagementServer/Manage.svc")
        );
        assert_eq!(app.parm("BACKCOMPATRETRYDISABLED").unwrap().value, None);

        let auths: Vec<_> = app.children.iter().filter(|c| c.kind == "APPAUTH").collect();
        assert_eq!(auths.len(), 2);
        assert_eq!(auths[0].parm("AAUTHNAME"), None);
        let server: Vec<_> = auths[1].parms.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            server,
            ["AAUTHLEVEL", "AAUTHTYPE", "AAUTHNAME", "AAUTHSECRET", "AAUTHDATA"]
        );
    }

    #[test]
    fn dm_client_poll_schedule() {
        let doc = enrollment_profile(&bundle(EnrollmentType::User), "DEV-1", &endpoint()).unwrap();
        let provider = doc.find(&["DMClient", "Provider", "DEMO MDM"]).unwrap();
        assert_eq!(provider.parm("EntDMID").unwrap().value.as_deref(), Some("DEV-1"));

        let poll = provider.child("Poll").unwrap();
        let retries = poll.parm("NumberOfFirstRetries").unwrap();
        assert_eq!(retries.value.as_deref(), Some("5"));
        assert_eq!(retries.datatype, Some(Datatype::Integer));
        let login = poll.parm("PollOnLogin").unwrap();
        assert_eq!(login.value.as_deref(), Some("true"));
        assert_eq!(login.datatype, Some(Datatype::Boolean));
    }

    #[test]
    fn app_auth_uses_configured_type() {
        let digest = enrollment_profile(&bundle(EnrollmentType::User), "DEV-1", &endpoint()).unwrap();
        let basic_endpoint = ManagementEndpoint {
            auth_type: AuthType::Basic,
            ..endpoint()
        };
        let basic = enrollment_profile(&bundle(EnrollmentType::User), "DEV-1", &basic_endpoint).unwrap();

        let auth_types = |doc: &ProvisioningDoc| -> Vec<String> {
            doc.find(&["APPLICATION"])
                .unwrap()
                .children
                .iter()
                .filter(|c| c.kind == "APPAUTH")
                .filter_map(|c| c.parm("AAUTHTYPE")?.value.clone())
                .collect()
        };
        assert_eq!(auth_types(&digest), ["DIGEST", "DIGEST"]);
        assert_eq!(auth_types(&basic), ["BASIC", "BASIC"]);
    }

    #[test]
    fn spaces_encode_as_percent_twenty() {
        assert_eq!(encode_uri_component("CN=Jane Doe"), "CN%3DJane%20Doe");
    }

    #[test]
    fn serialized_profile_reparses() {
        let doc = enrollment_profile(&bundle(EnrollmentType::User), "DEV-1", &endpoint()).unwrap();
        let xml = doc.to_xml().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><wap-provisioningdoc version="1.1">"#));
        assert!(xml.contains("Subject=CN%3Dalice%40example.com&amp;Stores=MY%5CUser"));
        assert_eq!(ProvisioningDoc::parse(&xml).unwrap(), doc);
    }
}
