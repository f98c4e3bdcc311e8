use rsa::{
    RsaPublicKey,
    pkcs1v15::{Signature, VerifyingKey},
    pkcs8::DecodePublicKey,
    signature::Verifier,
};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use x509_cert::{
    der::{Decode, Encode, asn1::ObjectIdentifier},
    request::CertReq,
};

use crate::error::{IssuanceError, IssuanceResult};

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

/**
    Decode a PKCS#10 request and check its self-signature.

    The public key is checked before the signature so that a request
    with an empty key reports [`IssuanceError::MissingPublicKey`].
*/
pub(crate) fn parse_request(der: &[u8]) -> IssuanceResult<CertReq> {
    let request = CertReq::from_der(der).map_err(|e| IssuanceError::MalformedCsr(e.to_string()))?;

    let spki = &request.info.public_key;
    if spki.subject_public_key.raw_bytes().is_empty() {
        return Err(IssuanceError::MissingPublicKey);
    }
    if spki.algorithm.oid != RSA_ENCRYPTION {
        return Err(IssuanceError::MalformedCsr(format!(
            "unsupported key algorithm {}",
            spki.algorithm.oid
        )));
    }

    let spki_der = spki
        .to_der()
        .map_err(|e| IssuanceError::MalformedCsr(e.to_string()))?;
    let public_key =
        RsaPublicKey::from_public_key_der(&spki_der).map_err(|_| IssuanceError::MissingPublicKey)?;

    verify_signature(&request, public_key)?;

    Ok(request)
}

fn verify_signature(request: &CertReq, public_key: RsaPublicKey) -> IssuanceResult<()> {
    let info = request
        .info
        .to_der()
        .map_err(|e| IssuanceError::MalformedCsr(e.to_string()))?;
    let signature = Signature::try_from(request.signature.raw_bytes())
        .map_err(|e| IssuanceError::MalformedCsr(e.to_string()))?;

    let oid = request.algorithm.oid;
    let result = if oid == SHA256_WITH_RSA {
        VerifyingKey::<Sha256>::new(public_key).verify(&info, &signature)
    } else if oid == SHA384_WITH_RSA {
        VerifyingKey::<Sha384>::new(public_key).verify(&info, &signature)
    } else if oid == SHA512_WITH_RSA {
        VerifyingKey::<Sha512>::new(public_key).verify(&info, &signature)
    } else if oid == SHA1_WITH_RSA {
        VerifyingKey::<Sha1>::new(public_key).verify(&info, &signature)
    } else {
        return Err(IssuanceError::MalformedCsr(format!(
            "unsupported signature algorithm {oid}"
        )));
    };

    result.map_err(|_| IssuanceError::MalformedCsr("signature does not verify".into()))
}

#[cfg(test)]
pub(crate) mod tests {
    use data_encoding::BASE64;
    use x509_cert::der::asn1::BitString;

    use super::*;

    pub const DEVICE_CSR_B64: &str = include_str!("../testdata/device.csr.b64");

    pub fn device_csr() -> Vec<u8> {
        BASE64.decode(DEVICE_CSR_B64.trim().as_bytes()).unwrap()
    }

    #[test]
    fn accepts_valid_request() {
        let request = parse_request(&device_csr()).unwrap();
        assert!(
            request
                .info
                .subject
                .to_string()
                .contains("B1C43CD0-1624-5FBB-8E54-34CF17DFD3A1")
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_request(b"definitely not DER"),
            Err(IssuanceError::MalformedCsr(_))
        ));
    }

    #[test]
    fn rejects_empty_public_key() {
        let mut request = CertReq::from_der(&device_csr()).unwrap();
        request.info.public_key.subject_public_key = BitString::from_bytes(&[]).unwrap();
        let der = request.to_der().unwrap();
        assert!(matches!(
            parse_request(&der),
            Err(IssuanceError::MissingPublicKey)
        ));
    }

    #[test]
    fn rejects_tampered_signature() {
        let mut request = CertReq::from_der(&device_csr()).unwrap();
        let mut bytes = request.signature.raw_bytes().to_vec();
        bytes[10] ^= 0xff;
        request.signature = BitString::from_bytes(&bytes).unwrap();
        let der = request.to_der().unwrap();
        assert!(matches!(
            parse_request(&der),
            Err(IssuanceError::MalformedCsr(msg)) if msg.contains("verify")
        ));
    }
}
