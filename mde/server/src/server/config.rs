use mde_protocol::wap::ManagementEndpoint;

/**
    Public addresses and identities the server advertises to clients.
*/
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL of the enrollment services, without a trailing slash.
    pub enrollment_url: String,
    pub management: ManagementEndpoint,
    pub policy_id: String,
    pub policy_name: String,
}

impl ServerConfig {
    pub fn service_url(&self, service: &str) -> String {
        format!("{}/EnrollmentServer/{service}", self.enrollment_url)
    }
}
