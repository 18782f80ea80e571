//! HTTP 402 payment instructions.
//!
//! Each 402 response carries everything an automated caller needs to pay the
//! session on-chain: the router contract, the frozen session terms, and call
//! descriptors for the three supported payment paths.

use std::str::FromStr;

use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::constants::network_name;
use crate::gate::SessionTerms;

sol! {
    /// Payment router entry points referenced by the call descriptors.
    interface IPaymentRouter {
        function payNativeFor(bytes32 sessionId, address merchant) external payable;
        function payFor(bytes32 sessionId, address merchant, address token, uint256 amount) external;
        function payForWithPermit(bytes32 sessionId, address merchant, address token, uint256 amount, uint256 deadline, uint8 v, bytes32 r, bytes32 s) external;
    }
}

pub const NATIVE_PAY_FN: &str = "payNativeFor(bytes32 sessionId, address merchant)";
pub const PAY_FOR_FN: &str =
    "payFor(bytes32 sessionId, address merchant, address token, uint256 amount)";
pub const PERMIT_PAY_FN: &str =
    "payForWithPermit(bytes32,address,address,uint256,uint256,uint8,bytes32,bytes32)";

/// Placeholders the caller fills in after signing the permit.
const DEADLINE_PLACEHOLDER: &str = "<unix_ts>";
const SIGNATURE_PLACEHOLDER: &str = "<v,r,s>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub chain_id: u64,
    pub name: String,
}

/// Body of `payment_required` / `session_expired` responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub session_id: String,
    pub network: Network,
    pub contract: String,
    pub amount_wei: String,
    pub merchant_wallet: String,
    pub token_address: String,
    pub calls: PaymentCalls,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCalls {
    pub native: NativeCall,
    pub erc20_approve_then_pay: ApproveThenPay,
    pub erc20_permit: PermitCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCall {
    #[serde(rename = "fn")]
    pub signature: String,
    /// Native value to attach, in smallest units.
    pub value: String,
    pub args: Vec<String>,
    /// ABI-encoded call data, 0x-prefixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calldata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveThenPay {
    pub approve: Approve,
    #[serde(rename = "payFor")]
    pub pay_for: PayForCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub spender: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayForCall {
    #[serde(rename = "fn")]
    pub signature: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calldata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitCall {
    #[serde(rename = "fn")]
    pub signature: String,
    pub args: PermitArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitArgs {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub merchant: String,
    pub token: String,
    pub amount: String,
    pub deadline: String,
    pub v_r_s: String,
}

/// Typed view of the session terms, when every field parses.
struct EncodedTerms {
    session: B256,
    merchant: Address,
    token: Address,
    amount: U256,
}

impl EncodedTerms {
    fn parse(session_id: &str, terms: &SessionTerms) -> Option<Self> {
        Some(Self {
            session: B256::from_str(session_id).ok()?,
            merchant: Address::from_str(&terms.merchant_wallet).ok()?,
            token: Address::from_str(&terms.token_address).ok()?,
            amount: U256::from_str_radix(&terms.amount_wei, 10).ok()?,
        })
    }

    fn native_calldata(&self) -> String {
        let call = IPaymentRouter::payNativeForCall {
            sessionId: self.session,
            merchant: self.merchant,
        };
        format!("0x{}", alloy::hex::encode(call.abi_encode()))
    }

    fn pay_for_calldata(&self) -> String {
        let call = IPaymentRouter::payForCall {
            sessionId: self.session,
            merchant: self.merchant,
            token: self.token,
            amount: self.amount,
        };
        format!("0x{}", alloy::hex::encode(call.abi_encode()))
    }
}

impl PaymentInfo {
    /// Instructions for paying `session_id` under the frozen `terms`.
    pub fn new(session_id: &str, terms: &SessionTerms, contract: Address) -> Self {
        let contract = format!("{:#x}", contract);
        let encoded = EncodedTerms::parse(session_id, terms);
        if encoded.is_none() {
            tracing::warn!(
                session_id = %session_id,
                "session terms do not ABI-encode, omitting calldata"
            );
        }

        let amount = terms.amount_wei.clone();
        let merchant = terms.merchant_wallet.clone();
        let token = terms.token_address.clone();

        PaymentInfo {
            session_id: session_id.to_string(),
            network: Network {
                chain_id: terms.chain_id,
                name: network_name(terms.chain_id),
            },
            contract: contract.clone(),
            amount_wei: amount.clone(),
            merchant_wallet: merchant.clone(),
            token_address: token.clone(),
            calls: PaymentCalls {
                native: NativeCall {
                    signature: NATIVE_PAY_FN.to_string(),
                    value: amount.clone(),
                    args: vec![session_id.to_string(), merchant.clone()],
                    calldata: encoded.as_ref().map(EncodedTerms::native_calldata),
                },
                erc20_approve_then_pay: ApproveThenPay {
                    approve: Approve {
                        spender: contract,
                        amount: amount.clone(),
                    },
                    pay_for: PayForCall {
                        signature: PAY_FOR_FN.to_string(),
                        args: vec![
                            session_id.to_string(),
                            merchant.clone(),
                            token.clone(),
                            amount.clone(),
                        ],
                        calldata: encoded.as_ref().map(EncodedTerms::pay_for_calldata),
                    },
                },
                erc20_permit: PermitCall {
                    signature: PERMIT_PAY_FN.to_string(),
                    args: PermitArgs {
                        session_id: session_id.to_string(),
                        merchant,
                        token,
                        amount,
                        deadline: DEADLINE_PLACEHOLDER.to_string(),
                        v_r_s: SIGNATURE_PLACEHOLDER.to_string(),
                    },
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_CONTRACT;

    const TOKEN: &str = "0x4242424242424242424242424242424242424242424242424242424242424242";

    fn native_terms() -> SessionTerms {
        SessionTerms {
            merchant_wallet: "0x1111111111111111111111111111111111111111".to_string(),
            token_address: "0x0000000000000000000000000000000000000000".to_string(),
            amount_wei: "100000000000000000".to_string(),
            chain_id: 43114,
        }
    }

    #[test]
    fn test_payment_info_wire_shape() {
        let info = PaymentInfo::new(TOKEN, &native_terms(), DEFAULT_CONTRACT);
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["session_id"], TOKEN);
        assert_eq!(json["network"]["chain_id"], 43114);
        assert_eq!(json["network"]["name"], "Avalanche C-Chain");
        assert_eq!(json["contract"], "0xda90fac43937ad84dc9483ff118c8c2cec5f1f56");
        assert_eq!(json["amount_wei"], "100000000000000000");

        let native = &json["calls"]["native"];
        assert_eq!(native["fn"], NATIVE_PAY_FN);
        assert_eq!(native["value"], "100000000000000000");
        assert_eq!(native["args"][0], TOKEN);
        assert_eq!(native["args"][1], "0x1111111111111111111111111111111111111111");

        let approve_then_pay = &json["calls"]["erc20_approve_then_pay"];
        assert_eq!(
            approve_then_pay["approve"]["spender"],
            "0xda90fac43937ad84dc9483ff118c8c2cec5f1f56"
        );
        assert_eq!(approve_then_pay["payFor"]["fn"], PAY_FOR_FN);
        assert_eq!(approve_then_pay["payFor"]["args"][3], "100000000000000000");

        let permit = &json["calls"]["erc20_permit"]["args"];
        assert_eq!(permit["sessionId"], TOKEN);
        assert_eq!(permit["deadline"], "<unix_ts>");
        assert_eq!(permit["v_r_s"], "<v,r,s>");
    }

    #[test]
    fn test_native_calldata_encodes_selector_and_args() {
        let info = PaymentInfo::new(TOKEN, &native_terms(), DEFAULT_CONTRACT);
        let calldata = info.calls.native.calldata.unwrap();
        let selector = alloy::hex::encode(IPaymentRouter::payNativeForCall::SELECTOR);

        // selector + two 32-byte words
        assert_eq!(calldata.len(), 2 + 8 + 64 * 2);
        assert!(calldata.starts_with(&format!("0x{selector}")));
        assert!(calldata.contains(&"42".repeat(32)));
        assert!(calldata.ends_with("1111111111111111111111111111111111111111"));
    }

    #[test]
    fn test_pay_for_calldata_decodes_back() {
        let info = PaymentInfo::new(TOKEN, &native_terms(), DEFAULT_CONTRACT);
        let calldata = info.calls.erc20_approve_then_pay.pay_for.calldata.unwrap();
        let bytes = alloy::hex::decode(calldata).unwrap();
        let decoded = IPaymentRouter::payForCall::abi_decode(&bytes).unwrap();
        assert_eq!(decoded.amount, U256::from(100_000_000_000_000_000u128));
        assert_eq!(decoded.merchant, Address::repeat_byte(0x11));
        assert_eq!(decoded.token, Address::ZERO);
    }

    #[test]
    fn test_unencodable_terms_omit_calldata() {
        let info = PaymentInfo::new("not-a-token", &native_terms(), DEFAULT_CONTRACT);
        assert!(info.calls.native.calldata.is_none());
        assert!(info.calls.erc20_approve_then_pay.pay_for.calldata.is_none());
        let json = serde_json::to_value(&info).unwrap();
        assert!(json["calls"]["native"].get("calldata").is_none());
        assert_eq!(json["calls"]["native"]["args"][0], "not-a-token");
    }
}
