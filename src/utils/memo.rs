use soroban_rs::xdr::{Hash, Memo, StringM};

use crate::{constants::MAX_MEMO_TEXT_LENGTH, models::MemoType};

/// Builds the XDR memo for a payment. An empty memo means no memo.
pub fn parse_memo(memo: Option<&str>, memo_type: Option<MemoType>) -> Result<Memo, String> {
    let memo = match memo.map(str::trim) {
        None | Some("") => return Ok(Memo::None),
        Some(memo) => memo,
    };
    let memo_type = memo_type.ok_or_else(|| "memo type is required".to_string())?;

    match memo_type {
        MemoType::Text => {
            if memo.len() > MAX_MEMO_TEXT_LENGTH {
                return Err(format!(
                    "text memo must be at most {MAX_MEMO_TEXT_LENGTH} bytes"
                ));
            }
            let text = StringM::<28>::try_from(memo).map_err(|e| e.to_string())?;
            Ok(Memo::Text(text))
        }
        MemoType::Id => memo
            .parse::<u64>()
            .map(Memo::Id)
            .map_err(|e| format!("invalid id memo {memo:?}: {e}")),
        MemoType::Hash | MemoType::Return => {
            let bytes = hex::decode(memo).map_err(|e| format!("invalid hash memo: {e}"))?;
            let hash: [u8; 32] = bytes
                .try_into()
                .map_err(|_| "hash memo must be 32 bytes".to_string())?;
            Ok(match memo_type {
                MemoType::Hash => Memo::Hash(Hash(hash)),
                _ => Memo::Return(Hash(hash)),
            })
        }
    }
}
