use soroban_rs::xdr::{
    AccountId, ContractId, Hash, MuxedAccount, PublicKey as XdrPublicKey, ScAddress, Uint256,
};
use stellar_strkey::{ed25519::PublicKey, Contract};

pub fn is_valid_account_address(address: &str) -> bool {
    PublicKey::from_string(address).is_ok()
}

pub fn is_valid_contract_address(address: &str) -> bool {
    Contract::from_string(address).is_ok()
}

pub fn parse_account_id(address: &str) -> Result<AccountId, String> {
    let pk = PublicKey::from_string(address)
        .map_err(|e| format!("invalid account address {address}: {e}"))?;
    Ok(AccountId(XdrPublicKey::PublicKeyTypeEd25519(Uint256(pk.0))))
}

pub fn parse_muxed_account(address: &str) -> Result<MuxedAccount, String> {
    let pk = PublicKey::from_string(address)
        .map_err(|e| format!("invalid account address {address}: {e}"))?;
    Ok(MuxedAccount::Ed25519(Uint256(pk.0)))
}

/// Parses a `G...` or `C...` address into a contract-call address.
pub fn parse_sc_address(address: &str) -> Result<ScAddress, String> {
    if let Ok(pk) = PublicKey::from_string(address) {
        return Ok(ScAddress::Account(AccountId(
            XdrPublicKey::PublicKeyTypeEd25519(Uint256(pk.0)),
        )));
    }
    if let Ok(contract) = Contract::from_string(address) {
        return Ok(ScAddress::Contract(ContractId(Hash(contract.0))));
    }
    Err(format!("invalid address {address}"))
}

pub fn contract_address_from_hash(hash: &Hash) -> String {
    Contract(hash.0).to_string()
}
