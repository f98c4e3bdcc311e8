/**
    Every XML namespace spoken by the enrollment services.

    Prefixed namespaces are always declared under the same prefix the
    Windows client uses. The service-specific namespaces are declared
    as the default namespace on their body element.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Soap,
    Addressing,
    WsSecurityUtility,
    WsSecurity,
    WsTrust,
    Authorization,
    XmlSchemaInstance,
    XmlSchema,
    Diagnostics,
    Discovery,
    EnrollmentPolicy,
    Enrollment,
    Dispatcher,
}

impl Namespace {
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Soap => "http://www.w3.org/2003/05/soap-envelope",
            Self::Addressing => "http://www.w3.org/2005/08/addressing",
            Self::WsSecurityUtility => {
                "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"
            }
            Self::WsSecurity => {
                "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"
            }
            Self::WsTrust => "http://docs.oasis-open.org/ws-sx/ws-trust/200512",
            Self::Authorization => "http://schemas.xmlsoap.org/ws/2006/12/authorization",
            Self::XmlSchemaInstance => "http://www.w3.org/2001/XMLSchema-instance",
            Self::XmlSchema => "http://www.w3.org/2001/XMLSchema",
            Self::Diagnostics => "http://schemas.microsoft.com/2004/09/ServiceModel/Diagnostics",
            Self::Discovery => "http://schemas.microsoft.com/windows/management/2012/01/enrollment",
            Self::EnrollmentPolicy => {
                "http://schemas.microsoft.com/windows/pki/2009/01/enrollmentpolicy"
            }
            Self::Enrollment => "http://schemas.microsoft.com/windows/pki/2009/01/enrollment",
            Self::Dispatcher => {
                "http://schemas.microsoft.com/net/2005/12/windowscommunicationfoundation/dispatcher"
            }
        }
    }

    /**
        The conventional prefix, or `None` for namespaces that
        are declared as the default namespace.
    */
    pub const fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Soap => Some("s"),
            Self::Addressing | Self::Dispatcher => Some("a"),
            Self::WsSecurityUtility => Some("u"),
            Self::WsSecurity => Some("wsse"),
            Self::WsTrust => Some("wst"),
            Self::Authorization => Some("ac"),
            Self::XmlSchemaInstance => Some("xsi"),
            Self::XmlSchema => Some("xsd"),
            Self::Diagnostics | Self::Discovery | Self::EnrollmentPolicy | Self::Enrollment => None,
        }
    }

    /**
        Qualified name of `local` in this namespace, e.g. `s:Envelope`.
    */
    pub fn qualify(self, local: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{prefix}:{local}"),
            None => local.to_string(),
        }
    }

    /**
        The `xmlns` attribute declaring this namespace.
    */
    pub fn declaration(self) -> (String, &'static str) {
        let key = match self.prefix() {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        (key, self.uri())
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        ALL.iter().copied().find(|ns| ns.uri() == uri)
    }
}

const ALL: [Namespace; 13] = [
    Namespace::Soap,
    Namespace::Addressing,
    Namespace::WsSecurityUtility,
    Namespace::WsSecurity,
    Namespace::WsTrust,
    Namespace::Authorization,
    Namespace::XmlSchemaInstance,
    Namespace::XmlSchema,
    Namespace::Diagnostics,
    Namespace::Discovery,
    Namespace::EnrollmentPolicy,
    Namespace::Enrollment,
    Namespace::Dispatcher,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualify_uses_prefix() {
        assert_eq!(Namespace::Soap.qualify("Envelope"), "s:Envelope");
        assert_eq!(Namespace::Discovery.qualify("Discover"), "Discover");
    }

    #[test]
    fn declarations() {
        assert_eq!(
            Namespace::WsTrust.declaration(),
            ("xmlns:wst".to_string(), Namespace::WsTrust.uri())
        );
        assert_eq!(Namespace::EnrollmentPolicy.declaration().0, "xmlns");
    }

    #[test]
    fn uri_lookup_round_trips() {
        for ns in ALL {
            assert_eq!(Namespace::from_uri(ns.uri()), Some(ns));
        }
        assert_eq!(Namespace::from_uri("urn:unknown"), None);
    }
}
