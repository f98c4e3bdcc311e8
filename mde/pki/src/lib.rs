/*!
    Identity certificate issuance for enrolling devices.

    A [`CaIdentity`] is loaded once and [`issue`] turns a PKCS#10
    request into a leaf certificate signed by it.
*/

use sha1::{Digest, Sha1};

mod csr;
mod error;
mod identity;
mod issue;

pub use error::{CaError, CaResult, IssuanceError, IssuanceResult};
pub use identity::CaIdentity;
pub use issue::{
    CERTIFICATE_LIFETIME_MONTHS, DEVICE_ID_OID, EnrollmentType, IssueRequest, IssuedCertificateBundle,
    issue,
};

/**
    Upper-case hex SHA-1 of a DER certificate, the form Windows uses
    to key certificate store entries.
*/
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(der))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_of_empty_input() {
        assert_eq!(fingerprint(b""), "DA39A3EE5E6B4B0D3255BFEF95601890AFD80709");
    }
}
