use std::time::SystemTime;

use chrono::{DateTime, Months, Utc};
use rand::RngCore;
use rsa::pkcs1v15::Signature;
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    der::{
        self, Encode, Length, Writer,
        asn1::{Any, ObjectIdentifier, SetOfVec, Utf8StringRef},
        oid::AssociatedOid,
    },
    attr::AttributeTypeAndValue,
    ext::{
        AsExtension, Extension,
        pkix::{BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages},
    },
    name::{Name, RdnSequence, RelativeDistinguishedName},
    serial_number::SerialNumber,
    time::{Time, Validity},
};

use crate::csr::parse_request;
use crate::error::{IssuanceError, IssuanceResult};
use crate::fingerprint;
use crate::identity::CaIdentity;

/**
    Lifetime of every issued identity certificate, in calendar months.
*/
pub const CERTIFICATE_LIFETIME_MONTHS: u32 = 12;

/**
    Private extension carrying the enrolled device's identifier.
*/
pub const DEVICE_ID_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.66.1.0");

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const CLIENT_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2");

/**
    Whether the certificate identifies the machine or the signed-in user.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentType {
    Device,
    User,
}

impl EnrollmentType {
    /**
        Interpret the `EnrollmentType` context item. Only `Device` selects
        a device enrollment, anything else (including `Full`) is a user one.
    */
    pub fn from_context(value: &str) -> Self {
        if value == "Device" {
            Self::Device
        } else {
            Self::User
        }
    }

    /**
        Name of the certificate store the leaf is installed into.
    */
    pub const fn store(self) -> &'static str {
        match self {
            Self::Device => "Device",
            Self::User => "User",
        }
    }
}

/**
    Who the certificate is issued to.

    The subject comes from the authenticated principal, never from the
    subject written in the certificate request.
*/
#[derive(Debug, Clone, Copy)]
pub struct IssueRequest<'a> {
    pub enrollment_type: EnrollmentType,
    pub common_name: &'a str,
    pub device_id: &'a str,
}

/**
    Everything produced by a successful issuance.
*/
#[derive(Debug, Clone)]
pub struct IssuedCertificateBundle {
    pub root_fingerprint: String,
    pub root_der: Vec<u8>,
    pub leaf_fingerprint: String,
    pub leaf_der: Vec<u8>,
    pub subject: String,
    pub serial: String,
    pub enrollment_type: EnrollmentType,
}

/**
    Issue a client-authentication certificate for the public key in `csr_der`.

    The certificate is valid from `now` until the same calendar date a
    year later. Every call draws a fresh serial number, so two calls with
    the same request produce two distinct certificates.
*/
pub fn issue(
    csr_der: &[u8],
    request: &IssueRequest<'_>,
    ca: &CaIdentity,
    now: DateTime<Utc>,
) -> IssuanceResult<IssuedCertificateBundle> {
    let csr = parse_request(csr_der)?;
    let subject = common_name(request.common_name)?;
    let validity = validity(now)?;

    let mut builder = CertificateBuilder::new(
        Profile::Manual {
            issuer: Some(ca.subject().clone()),
        },
        random_serial()?,
        validity,
        subject,
        csr.info.public_key,
        ca.signing_key(),
    )
    .map_err(signing)?;

    builder
        .add_extension(&BasicConstraints {
            ca: false,
            path_len_constraint: None,
        })
        .map_err(signing)?;
    builder
        .add_extension(&KeyUsage(
            KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment,
        ))
        .map_err(signing)?;
    builder
        .add_extension(&ClientAuthentication)
        .map_err(signing)?;
    builder
        .add_extension(&DeviceIdentifier(request.device_id))
        .map_err(signing)?;

    let certificate = builder.build::<Signature>().map_err(signing)?;
    let leaf_der = certificate.to_der().map_err(signing)?;
    let tbs = &certificate.tbs_certificate;

    let bundle = IssuedCertificateBundle {
        root_fingerprint: ca.fingerprint().to_string(),
        root_der: ca.certificate_der().to_vec(),
        leaf_fingerprint: fingerprint(&leaf_der),
        subject: tbs.subject.to_string(),
        serial: hex::encode_upper(tbs.serial_number.as_bytes()),
        enrollment_type: request.enrollment_type,
        leaf_der,
    };

    tracing::debug!(
        subject = %bundle.subject,
        serial = %bundle.serial,
        fingerprint = %bundle.leaf_fingerprint,
        "issued identity certificate"
    );

    Ok(bundle)
}

fn validity(now: DateTime<Utc>) -> IssuanceResult<Validity> {
    let not_after = now
        .checked_add_months(Months::new(CERTIFICATE_LIFETIME_MONTHS))
        .ok_or_else(|| signing("validity end is out of range"))?;
    Ok(Validity {
        not_before: Time::try_from(SystemTime::from(now)).map_err(signing)?,
        not_after: Time::try_from(SystemTime::from(not_after)).map_err(signing)?,
    })
}

fn signing(e: impl std::fmt::Display) -> IssuanceError {
    IssuanceError::SigningFailure(e.to_string())
}

/**
    16 random octets with the top bit cleared, never zero.
*/
fn random_serial() -> IssuanceResult<SerialNumber> {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes[0] &= 0x7f;
    if bytes.iter().all(|b| *b == 0) {
        bytes[15] = 1;
    }
    SerialNumber::new(&bytes).map_err(signing)
}

fn common_name(cn: &str) -> IssuanceResult<Name> {
    if cn.is_empty() {
        return Err(IssuanceError::InvalidSubject("empty common name".into()));
    }
    let invalid = |e: der::Error| IssuanceError::InvalidSubject(e.to_string());

    let value = Any::encode_from(&Utf8StringRef::new(cn).map_err(invalid)?).map_err(invalid)?;
    let attribute = AttributeTypeAndValue {
        oid: COMMON_NAME,
        value,
    };
    let rdn = RelativeDistinguishedName(SetOfVec::try_from(vec![attribute]).map_err(invalid)?);
    Ok(RdnSequence(vec![rdn]))
}

// ── Extensions ─────────────────────────────────────────────────────────

/**
    Extended key usage restricted to client authentication, marked critical.
*/
struct ClientAuthentication;

impl ClientAuthentication {
    fn usage() -> ExtendedKeyUsage {
        ExtendedKeyUsage(vec![CLIENT_AUTH])
    }
}

impl AssociatedOid for ClientAuthentication {
    const OID: ObjectIdentifier = ExtendedKeyUsage::OID;
}

impl Encode for ClientAuthentication {
    fn encoded_len(&self) -> der::Result<Length> {
        Self::usage().encoded_len()
    }

    fn encode(&self, writer: &mut impl Writer) -> der::Result<()> {
        Self::usage().encode(writer)
    }
}

impl AsExtension for ClientAuthentication {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        true
    }
}

/**
    Device identifier as a UTF8String.
*/
struct DeviceIdentifier<'a>(&'a str);

impl AssociatedOid for DeviceIdentifier<'_> {
    const OID: ObjectIdentifier = DEVICE_ID_OID;
}

impl Encode for DeviceIdentifier<'_> {
    fn encoded_len(&self) -> der::Result<Length> {
        Utf8StringRef::new(self.0)?.encoded_len()
    }

    fn encode(&self, writer: &mut impl Writer) -> der::Result<()> {
        Utf8StringRef::new(self.0)?.encode(writer)
    }
}

impl AsExtension for DeviceIdentifier<'_> {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use rsa::{pkcs1v15::VerifyingKey, signature::Verifier};
    use sha1::{Digest, Sha1};
    use sha2::Sha256;
    use x509_cert::{Certificate, der::Decode};

    use super::*;
    use crate::csr::tests::device_csr;
    use crate::identity::tests::test_ca;

    const DEVICE_ID: &str = "B1C43CD0-1624-5FBB-8E54-34CF17DFD3A1";

    fn device_request() -> IssueRequest<'static> {
        IssueRequest {
            enrollment_type: EnrollmentType::Device,
            common_name: DEVICE_ID,
            device_id: DEVICE_ID,
        }
    }

    fn extension<'a>(certificate: &'a Certificate, oid: ObjectIdentifier) -> &'a Extension {
        certificate
            .tbs_certificate
            .extensions
            .as_ref()
            .and_then(|exts| exts.iter().find(|ext| ext.extn_id == oid))
            .unwrap()
    }

    #[test]
    fn leaf_verifies_against_ca() {
        let ca = test_ca();
        let bundle = issue(&device_csr(), &device_request(), &ca, Utc::now()).unwrap();
        let leaf = Certificate::from_der(&bundle.leaf_der).unwrap();

        assert_eq!(&leaf.tbs_certificate.issuer, ca.subject());

        let tbs = leaf.tbs_certificate.to_der().unwrap();
        let signature = Signature::try_from(leaf.signature.raw_bytes()).unwrap();
        VerifyingKey::<Sha256>::new(ca.public_key().clone())
            .verify(&tbs, &signature)
            .unwrap();
    }

    #[test]
    fn fingerprints_are_upper_hex_sha1() {
        let ca = test_ca();
        let bundle = issue(&device_csr(), &device_request(), &ca, Utc::now()).unwrap();

        assert_eq!(
            bundle.leaf_fingerprint,
            hex::encode_upper(Sha1::digest(&bundle.leaf_der))
        );
        assert_eq!(
            bundle.root_fingerprint,
            hex::encode_upper(Sha1::digest(&bundle.root_der))
        );
        for fp in [&bundle.leaf_fingerprint, &bundle.root_fingerprint] {
            assert_eq!(fp.len(), 40);
            assert!(fp.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    fn issued_validity(now: DateTime<Utc>) -> (i64, i64) {
        let bundle = issue(&device_csr(), &device_request(), &test_ca(), now).unwrap();
        let validity = Certificate::from_der(&bundle.leaf_der)
            .unwrap()
            .tbs_certificate
            .validity;
        (
            validity.not_before.to_unix_duration().as_secs() as i64,
            validity.not_after.to_unix_duration().as_secs() as i64,
        )
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn valid_for_one_year() {
        let (not_before, not_after) = issued_validity(at("2026-06-15T12:30:00Z"));
        assert_eq!(not_before, at("2026-06-15T12:30:00Z").timestamp());
        assert_eq!(not_after, at("2027-06-15T12:30:00Z").timestamp());
    }

    #[test]
    fn one_year_spans_a_leap_day() {
        let (not_before, not_after) = issued_validity(at("2027-03-01T00:00:00Z"));
        assert_eq!(not_before, at("2027-03-01T00:00:00Z").timestamp());
        assert_eq!(not_after, at("2028-03-01T00:00:00Z").timestamp());
        assert_eq!(not_after - not_before, 366 * 24 * 60 * 60);
    }

    #[test]
    fn subject_comes_from_request_not_csr() {
        let request = IssueRequest {
            enrollment_type: EnrollmentType::User,
            common_name: "alice@example.com",
            device_id: DEVICE_ID,
        };
        let bundle = issue(&device_csr(), &request, &test_ca(), Utc::now()).unwrap();
        assert_eq!(bundle.subject, "CN=alice@example.com");
        assert_eq!(bundle.enrollment_type, EnrollmentType::User);
    }

    #[test]
    fn serials_are_fresh_and_non_zero() {
        let ca = test_ca();
        let a = issue(&device_csr(), &device_request(), &ca, Utc::now()).unwrap();
        let b = issue(&device_csr(), &device_request(), &ca, Utc::now()).unwrap();
        assert_ne!(a.serial, b.serial);
        assert_ne!(a.leaf_fingerprint, b.leaf_fingerprint);
        assert!(a.serial.chars().any(|c| c != '0'));
    }

    #[test]
    fn carries_expected_extensions() {
        let bundle = issue(&device_csr(), &device_request(), &test_ca(), Utc::now()).unwrap();
        let leaf = Certificate::from_der(&bundle.leaf_der).unwrap();

        let basic = extension(&leaf, BasicConstraints::OID);
        assert!(basic.critical);
        let constraints = BasicConstraints::from_der(basic.extn_value.as_bytes()).unwrap();
        assert!(!constraints.ca);

        assert!(extension(&leaf, KeyUsage::OID).critical);

        let eku = extension(&leaf, ExtendedKeyUsage::OID);
        assert!(eku.critical);
        let usage = ExtendedKeyUsage::from_der(eku.extn_value.as_bytes()).unwrap();
        assert_eq!(usage.0, vec![CLIENT_AUTH]);

        let device = extension(&leaf, DEVICE_ID_OID);
        assert!(!device.critical);
        let value = Utf8StringRef::from_der(device.extn_value.as_bytes()).unwrap();
        assert_eq!(value.as_str(), DEVICE_ID);
    }

    #[test]
    fn missing_public_key_issues_nothing() {
        use x509_cert::{der::asn1::BitString, request::CertReq};

        let mut csr = CertReq::from_der(&device_csr()).unwrap();
        csr.info.public_key.subject_public_key = BitString::from_bytes(&[]).unwrap();
        let result = issue(&csr.to_der().unwrap(), &device_request(), &test_ca(), Utc::now());
        assert!(matches!(result, Err(IssuanceError::MissingPublicKey)));
    }

    #[test]
    fn rejects_empty_subject() {
        let request = IssueRequest {
            common_name: "",
            ..device_request()
        };
        assert!(matches!(
            issue(&device_csr(), &request, &test_ca(), Utc::now()),
            Err(IssuanceError::InvalidSubject(_))
        ));
    }

    #[test]
    fn enrollment_type_from_context() {
        assert_eq!(EnrollmentType::from_context("Device"), EnrollmentType::Device);
        assert_eq!(EnrollmentType::from_context("Full"), EnrollmentType::User);
        assert_eq!(EnrollmentType::from_context(""), EnrollmentType::User);
        assert_eq!(EnrollmentType::Device.store(), "Device");
    }
}
