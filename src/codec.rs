use ethereum_types::U256;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use rlp::{Rlp, RlpStream};
use serde_json::json;
use sha3::{Digest, Keccak256};

use crate::config::ZERO_ADDRESS_HEX;
use crate::error::BridgeError;

pub const ZERO_ADDRESS: [u8; 20] = [0u8; 20];

/// Decoded externally-signed Ethereum transaction.
#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    /// Canonical hash: keccak256 of the full raw bytes, type byte included
    pub hash: [u8; 32],
    /// Sender recovered from the signature
    pub from: [u8; 20],
    /// Recipient; None for contract creation
    pub to: Option<[u8; 20]>,
    pub nonce: u64,
    pub value: U256,
    pub data: Vec<u8>,
    pub gas_limit: u64,
    /// Legacy gas price, or max-fee-per-gas for type-2 transactions
    pub gas_price: U256,
    /// 0 = legacy, 2 = EIP-1559
    pub tx_type: u8,
    pub chain_id: Option<u64>,
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl DecodedTransaction {
    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash))
    }

    /// Lower-cased sender address, usable as a stable cache key.
    pub fn from_hex(&self) -> String {
        format!("0x{}", hex::encode(self.from))
    }

    /// Recipient address, with the zero address standing in for creation.
    pub fn to_hex_or_zero(&self) -> String {
        match self.to {
            Some(addr) => format!("0x{}", hex::encode(addr)),
            None => ZERO_ADDRESS_HEX.to_string(),
        }
    }

    pub fn input_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.data))
    }

    /// A missing or zero recipient means the transaction deploys a contract.
    pub fn is_create(&self) -> bool {
        match self.to {
            Some(addr) => addr == ZERO_ADDRESS,
            None => true,
        }
    }

    /// Decoded-info snapshot persisted alongside the raw transaction.
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "hash": self.hash_hex(),
            "from": self.from_hex(),
            "to": self.to_hex_or_zero(),
            "nonce": self.nonce,
            "value": format!("0x{:x}", self.value),
            "data": self.input_hex(),
            "gasPrice": format!("0x{:x}", self.gas_price),
            "limit": format!("0x{:x}", self.gas_limit),
            "type": format!("0x{:x}", self.tx_type),
            "v": self.v,
            "r": format!("0x{}", hex::encode(self.r)),
            "s": format!("0x{}", hex::encode(self.s)),
            "chainId": self.chain_id,
        })
    }
}

/// Decode a raw signed Ethereum transaction (legacy RLP or EIP-1559
/// envelope) and recover its sender.
pub fn decode_raw_transaction(raw: &[u8]) -> Result<DecodedTransaction, BridgeError> {
    if raw.is_empty() {
        return Err(BridgeError::malformed("empty transaction payload"));
    }
    if raw[0] == 0x02 {
        decode_eip1559(&raw[1..], raw)
    } else if raw[0] < 0x7f {
        Err(BridgeError::malformed(format!(
            "unsupported transaction type {}",
            raw[0]
        )))
    } else {
        decode_legacy(raw)
    }
}

/// Hex-decode a 0x-prefixed raw transaction string and decode it.
pub fn decode_raw_transaction_hex(raw_hex: &str) -> Result<DecodedTransaction, BridgeError> {
    let stripped = raw_hex.strip_prefix("0x").unwrap_or(raw_hex);
    let raw = hex::decode(stripped)
        .map_err(|e| BridgeError::malformed(format!("invalid transaction hex: {e}")))?;
    decode_raw_transaction(&raw)
}

fn decode_legacy(raw: &[u8]) -> Result<DecodedTransaction, BridgeError> {
    let rlp = Rlp::new(raw);
    if !rlp.is_list() {
        return Err(BridgeError::malformed("transaction RLP is not a list"));
    }
    let item_count = rlp.item_count().map_err(rlp_err)?;
    if item_count != 9 {
        return Err(BridgeError::malformed(format!(
            "expected 9 RLP fields in a signed legacy transaction, got {item_count}"
        )));
    }

    let nonce: u64 = rlp.val_at(0).map_err(rlp_err)?;
    let gas_price = u256_at(&rlp, 1)?;
    let gas_limit: u64 = rlp.val_at(2).map_err(rlp_err)?;
    let to = address_at(&rlp, 3)?;
    let value = u256_at(&rlp, 4)?;
    let data: Vec<u8> = rlp.val_at(5).map_err(rlp_err)?;
    let v: u64 = rlp.val_at(6).map_err(rlp_err)?;
    let r = word_at(&rlp, 7)?;
    let s = word_at(&rlp, 8)?;

    // EIP-155 folds the chain id into v; 27/28 is the pre-155 form.
    let (chain_id, recovery) = if v >= 35 {
        let chain_id = (v - 35) / 2;
        (Some(chain_id), (v - 35 - 2 * chain_id) as u8)
    } else if v == 27 || v == 28 {
        (None, (v - 27) as u8)
    } else {
        return Err(BridgeError::malformed(format!("invalid signature v {v}")));
    };

    let prehash = legacy_signing_hash(nonce, gas_price, gas_limit, to, value, &data, chain_id);
    let from = recover_sender(&prehash, &r, &s, recovery)?;

    Ok(DecodedTransaction {
        hash: keccak(raw),
        from,
        to,
        nonce,
        value,
        data,
        gas_limit,
        gas_price,
        tx_type: 0,
        chain_id,
        v,
        r,
        s,
    })
}

fn decode_eip1559(body: &[u8], raw: &[u8]) -> Result<DecodedTransaction, BridgeError> {
    let rlp = Rlp::new(body);
    if !rlp.is_list() {
        return Err(BridgeError::malformed("transaction RLP is not a list"));
    }
    let item_count = rlp.item_count().map_err(rlp_err)?;
    if item_count != 12 {
        return Err(BridgeError::malformed(format!(
            "expected 12 RLP fields in a signed type-2 transaction, got {item_count}"
        )));
    }

    let chain_id: u64 = rlp.val_at(0).map_err(rlp_err)?;
    let nonce: u64 = rlp.val_at(1).map_err(rlp_err)?;
    let max_priority_fee = u256_at(&rlp, 2)?;
    let max_fee = u256_at(&rlp, 3)?;
    let gas_limit: u64 = rlp.val_at(4).map_err(rlp_err)?;
    let to = address_at(&rlp, 5)?;
    let value = u256_at(&rlp, 6)?;
    let data: Vec<u8> = rlp.val_at(7).map_err(rlp_err)?;
    let access_list = rlp.at(8).map_err(rlp_err)?.as_raw().to_vec();
    let y_parity: u64 = rlp.val_at(9).map_err(rlp_err)?;
    let r = word_at(&rlp, 10)?;
    let s = word_at(&rlp, 11)?;

    if y_parity > 1 {
        return Err(BridgeError::malformed(format!(
            "invalid signature y-parity {y_parity}"
        )));
    }

    let prehash = eip1559_signing_hash(
        chain_id,
        nonce,
        max_priority_fee,
        max_fee,
        gas_limit,
        to,
        value,
        &data,
        &access_list,
    );
    let from = recover_sender(&prehash, &r, &s, y_parity as u8)?;

    Ok(DecodedTransaction {
        hash: keccak(raw),
        from,
        to,
        nonce,
        value,
        data,
        gas_limit,
        gas_price: max_fee,
        tx_type: 2,
        chain_id: Some(chain_id),
        v: y_parity,
        r,
        s,
    })
}

fn legacy_signing_hash(
    nonce: u64,
    gas_price: U256,
    gas_limit: u64,
    to: Option<[u8; 20]>,
    value: U256,
    data: &[u8],
    chain_id: Option<u64>,
) -> [u8; 32] {
    let mut stream = RlpStream::new_list(if chain_id.is_some() { 9 } else { 6 });
    stream.append(&nonce);
    append_u256(&mut stream, gas_price);
    stream.append(&gas_limit);
    append_address(&mut stream, to);
    append_u256(&mut stream, value);
    stream.append(&data.to_vec());
    if let Some(chain_id) = chain_id {
        stream.append(&chain_id);
        stream.append_empty_data();
        stream.append_empty_data();
    }
    keccak(&stream.out().to_vec())
}

#[allow(clippy::too_many_arguments)]
fn eip1559_signing_hash(
    chain_id: u64,
    nonce: u64,
    max_priority_fee: U256,
    max_fee: U256,
    gas_limit: u64,
    to: Option<[u8; 20]>,
    value: U256,
    data: &[u8],
    access_list: &[u8],
) -> [u8; 32] {
    let mut stream = RlpStream::new_list(9);
    stream.append(&chain_id);
    stream.append(&nonce);
    append_u256(&mut stream, max_priority_fee);
    append_u256(&mut stream, max_fee);
    stream.append(&gas_limit);
    append_address(&mut stream, to);
    append_u256(&mut stream, value);
    stream.append(&data.to_vec());
    stream.append_raw(access_list, 1);

    let mut payload = vec![0x02u8];
    payload.extend_from_slice(&stream.out());
    keccak(&payload)
}

fn recover_sender(
    prehash: &[u8; 32],
    r: &[u8; 32],
    s: &[u8; 32],
    recovery: u8,
) -> Result<[u8; 20], BridgeError> {
    let signature = Signature::from_scalars(*r, *s)
        .map_err(|e| BridgeError::malformed(format!("invalid signature scalars: {e}")))?;
    let recovery_id = RecoveryId::from_byte(recovery)
        .ok_or_else(|| BridgeError::malformed(format!("invalid recovery id {recovery}")))?;
    let key = VerifyingKey::recover_from_prehash(prehash, &signature, recovery_id)
        .map_err(|e| BridgeError::malformed(format!("signature recovery failed: {e}")))?;

    let point = key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Ok(address)
}

/// Standard contract-address derivation: keccak256(rlp([sender, nonce]))[12..].
pub fn derive_contract_address(sender: &[u8; 20], nonce: u64) -> [u8; 20] {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender.to_vec());
    stream.append(&nonce);
    let digest = keccak(&stream.out().to_vec());
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

pub fn keccak(bytes: &[u8]) -> [u8; 32] {
    let digest = Keccak256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Minimal big-endian byte form of a quantity, hex encoded for use as a
/// vector<u8> argument on the ledger. Zero encodes as a single zero byte.
pub fn u256_to_hex_bytes(value: U256) -> String {
    let bytes = value.to_big_endian();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(31);
    format!("0x{}", hex::encode(&bytes[start..]))
}

fn append_u256(stream: &mut RlpStream, value: U256) {
    let bytes = value.to_big_endian();
    let trimmed: Vec<u8> = match bytes.iter().position(|b| *b != 0) {
        Some(start) => bytes[start..].to_vec(),
        None => Vec::new(),
    };
    stream.append(&trimmed);
}

fn append_address(stream: &mut RlpStream, address: Option<[u8; 20]>) {
    match address {
        Some(addr) => {
            stream.append(&addr.to_vec());
        }
        None => {
            stream.append_empty_data();
        }
    }
}

fn rlp_err(e: rlp::DecoderError) -> BridgeError {
    BridgeError::malformed(format!("RLP decode error: {e}"))
}

fn u256_at(rlp: &Rlp, index: usize) -> Result<U256, BridgeError> {
    let bytes = rlp.at(index).map_err(rlp_err)?.data().map_err(rlp_err)?;
    if bytes.len() > 32 {
        return Err(BridgeError::malformed("quantity larger than 32 bytes"));
    }
    Ok(U256::from_big_endian(bytes))
}

fn word_at(rlp: &Rlp, index: usize) -> Result<[u8; 32], BridgeError> {
    let bytes = rlp.at(index).map_err(rlp_err)?.data().map_err(rlp_err)?;
    if bytes.len() > 32 {
        return Err(BridgeError::malformed("signature word larger than 32 bytes"));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

fn address_at(rlp: &Rlp, index: usize) -> Result<Option<[u8; 20]>, BridgeError> {
    let bytes = rlp.at(index).map_err(rlp_err)?.data().map_err(rlp_err)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    if bytes.len() != 20 {
        return Err(BridgeError::malformed("recipient is not a 20-byte address"));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(bytes);
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    // The EIP-155 example transaction: nonce 9, 20 gwei gas price, 21000 gas,
    // 1 ether to 0x3535...35, signed on chain id 1.
    const LEGACY_TX: &str = concat!(
        "f86c098504a817c800825208943535353535353535353535353535353535353535",
        "880de0b6b3a764000080",
        "25",
        "a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276",
        "a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83",
    );

    // A type-2 call with 100 bytes of calldata, signed on chain id 336.
    const EIP1559_TX: &str = concat!(
        "02f8d58201500486015d3ef7980086015d3ef79800825208",
        "946a9a394cb23b2c5b2e4290f75f80a8e049f3347e",
        "80",
        "b864c47f0027",
        "0000000000000000000000000000000000000000000000000000000000000020",
        "0000000000000000000000000000000000000000000000000000000000000006",
        "68656c6c6f320000000000000000000000000000000000000000000000000000",
        "c0",
        "01",
        "a038787b861c38d1ff1efaa187cba5f4939228d103e732eae0173d7078389e0af9",
        "a079d70b4d9453f35688d3930bbfd87827a274eec1a7ffd8034898d5a600c14811",
    );

    fn raw(tx: &str) -> Vec<u8> {
        hex::decode(tx).unwrap()
    }

    #[test]
    fn decodes_legacy_eip155_transaction() {
        let bytes = raw(LEGACY_TX);
        let decoded = decode_raw_transaction(&bytes).unwrap();

        assert_eq!(decoded.tx_type, 0);
        assert_eq!(decoded.nonce, 9);
        assert_eq!(decoded.gas_limit, 21_000);
        assert_eq!(decoded.gas_price, U256::from(20_000_000_000u64));
        assert_eq!(decoded.value, U256::from(1_000_000_000_000_000_000u64));
        assert_eq!(decoded.chain_id, Some(1));
        assert_eq!(decoded.v, 37);
        assert_eq!(
            decoded.to_hex_or_zero(),
            "0x3535353535353535353535353535353535353535"
        );
        assert_eq!(
            decoded.from_hex(),
            "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"
        );
    }

    #[test]
    fn canonical_hash_is_keccak_of_raw_bytes() {
        let bytes = raw(LEGACY_TX);
        let decoded = decode_raw_transaction(&bytes).unwrap();
        assert_eq!(decoded.hash, keccak(&bytes));

        let bytes = raw(EIP1559_TX);
        let decoded = decode_raw_transaction(&bytes).unwrap();
        // Type byte is part of the hashed payload.
        assert_eq!(decoded.hash, keccak(&bytes));
    }

    #[test]
    fn decodes_eip1559_transaction() {
        let bytes = raw(EIP1559_TX);
        let decoded = decode_raw_transaction(&bytes).unwrap();

        assert_eq!(decoded.tx_type, 2);
        assert_eq!(decoded.chain_id, Some(336));
        assert_eq!(decoded.nonce, 4);
        assert_eq!(decoded.gas_limit, 21_000);
        // Gas price comes from the max-fee field for type-2 transactions.
        assert_eq!(decoded.gas_price, U256::from(1_500_000_000_000u64));
        assert_eq!(decoded.value, U256::zero());
        assert_eq!(decoded.data.len(), 100);
        assert_eq!(
            decoded.to_hex_or_zero(),
            "0x6a9a394cb23b2c5b2e4290f75f80a8e049f3347e"
        );
        assert!(!decoded.is_create());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            decode_raw_transaction(&[]),
            Err(BridgeError::MalformedTransaction(_))
        ));
        assert!(matches!(
            decode_raw_transaction(&[0x01, 0xc0]),
            Err(BridgeError::MalformedTransaction(_))
        ));
        // Truncated legacy payload
        let mut bytes = raw(LEGACY_TX);
        bytes.truncate(bytes.len() - 10);
        assert!(decode_raw_transaction(&bytes).is_err());
    }

    #[test]
    fn rejects_tampered_signature() {
        let mut bytes = raw(LEGACY_TX);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let result = decode_raw_transaction(&bytes);
        // Either recovery fails outright or yields a different sender.
        if let Ok(decoded) = result {
            assert_ne!(
                decoded.from_hex(),
                "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"
            );
        }
    }

    #[test]
    fn derives_contract_address() {
        let mut sender = [0u8; 20];
        sender.copy_from_slice(&hex::decode("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap());
        let derived = derive_contract_address(&sender, 0);
        assert_eq!(
            hex::encode(derived),
            "cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d"
        );
    }

    #[test]
    fn quantity_byte_encoding() {
        assert_eq!(u256_to_hex_bytes(U256::zero()), "0x00");
        assert_eq!(u256_to_hex_bytes(U256::from(1u8)), "0x01");
        assert_eq!(
            u256_to_hex_bytes(U256::from(1_000_000_000_000_000_000u64)),
            "0x0de0b6b3a7640000"
        );
    }
}
