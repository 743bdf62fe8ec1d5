use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEX_LEN: usize = 64;

fn checkout_mac(secret: &str, order_id: &str, payment_id: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    mac
}

/// Gateway checkout signature: `hex(HMAC-SHA256(secret, "{orderId}|{paymentId}"))`.
pub fn sign_checkout(secret: &str, order_id: &str, payment_id: &str) -> String {
    hex::encode(checkout_mac(secret, order_id, payment_id).finalize().into_bytes())
}

/// Checks a gateway-supplied signature. Only the exact lower-case hex digest matches;
/// the comparison itself is constant time.
pub fn verify_checkout_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    if signature.len() != SIGNATURE_HEX_LEN
        || signature.bytes().any(|b| b.is_ascii_uppercase())
    {
        return false;
    }

    let Ok(provided) = hex::decode(signature) else {
        return false;
    };

    checkout_mac(secret, order_id, payment_id)
        .verify_slice(&provided)
        .is_ok()
}
