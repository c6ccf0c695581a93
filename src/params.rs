use crate::chain::ChainInterface;
use crate::coin_selection;
use crate::config::{
    FeePolicy, InterfaceConfig, TransactionParameterSet, TxInputSpec, TxOutputEntry, SENDER_ADDRESS_PLACEHOLDER,
    SIGNING_KEY_PLACEHOLDER,
};
use crate::error::AppError;
use crate::keys::{KeyFormat, KeyProvider};
use crate::types::{Network, UnspentOutput};

/// 送金元。アドレスのみ、または署名鍵 (WIF) で指定する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    Address(String),
    Key(String),
}

/// `--genparam` の入力
#[derive(Debug, Clone, Default)]
pub struct PaymentRequest {
    pub amount: Option<u64>,
    pub sender: Option<Sender>,
    pub recipient: Option<String>,
    pub change: Option<String>,
    pub fee: u64,
}

/// 解決済みの送金元アドレスと署名鍵
struct ResolvedSender {
    address: String,
    signing_key: String,
}

fn resolve_sender(sender: &Sender, network: Network, keys: &dyn KeyProvider) -> Result<ResolvedSender, AppError> {
    match sender {
        Sender::Address(address) => Ok(ResolvedSender {
            address: address.clone(),
            signing_key: SIGNING_KEY_PLACEHOLDER.to_string(),
        }),
        Sender::Key(wif) => {
            let key = keys.decode(wif, KeyFormat::Wif, network)?;
            Ok(ResolvedSender {
                address: keys.address_for(&key, network).to_string(),
                signing_key: wif.clone(),
            })
        }
    }
}

/// 選択済み UTXO を入力レコードにする。署名に必要な元トランザクションも取得する。
fn input_records(
    utxos: &[UnspentOutput],
    signing_key: &str,
    chain: &dyn ChainInterface,
) -> Result<Vec<TxInputSpec>, AppError> {
    utxos
        .iter()
        .map(|utxo| {
            Ok(TxInputSpec {
                tx_hash: Some(utxo.tx_hash.clone()),
                tx_pos: Some(utxo.tx_pos),
                amount: Some(utxo.value),
                private_key_for_signing: Some(signing_key.to_string()),
                input_tx_hash: Some(chain.get_raw_transaction(&utxo.tx_hash)?),
            })
        })
        .collect()
}

/// 金額と送金元からパラメータセットを生成する
pub fn generate_parameters(
    request: &PaymentRequest,
    network: Network,
    chain: &dyn ChainInterface,
    keys: &dyn KeyProvider,
) -> Result<TransactionParameterSet, AppError> {
    log::info!("パラメータを生成します。");
    let mut params = TransactionParameterSet {
        interface: Some(InterfaceConfig::for_network(network)),
        ..Default::default()
    };

    let sender = request
        .sender
        .as_ref()
        .map(|s| resolve_sender(s, network, keys))
        .transpose()?;

    if let (Some(amount), Some(sender)) = (request.amount, sender.as_ref()) {
        let required = amount
            .checked_add(request.fee)
            .ok_or_else(|| AppError::InputValidation(format!("金額と手数料の合計が大きすぎます: {} + {}", amount, request.fee)))?;
        let balance = chain.get_balance(&sender.address)?;
        log::debug!("送金元 {} の残高: {:?}", sender.address, balance);
        // i64 に収まらない要求額はどの残高でも満たせない
        let covered = i64::try_from(required).is_ok_and(|required| balance.total() >= required);
        if !covered {
            return Err(AppError::InsufficientFunds {
                available: balance.total().max(0) as u64,
                required,
            });
        }
        let available = chain.get_utxo(&sender.address)?;
        let selected = coin_selection::select(&available, required)?;
        params.transactioninput = Some(input_records(&selected, &sender.signing_key, chain)?);
    }

    if let Some(recipient) = &request.recipient {
        params.transactionoutput = Some(vec![TxOutputEntry {
            public_key: Some(recipient.clone()),
            amount: request.amount,
            op_return: Some(false),
            data_to_encode: String::new(),
            data_to_encode_file: false,
        }]);
    }

    let change_address = request
        .change
        .clone()
        .or_else(|| sender.as_ref().map(|s| s.address.clone()))
        .unwrap_or_else(|| SENDER_ADDRESS_PLACEHOLDER.to_string());
    params.tx_info = Some(FeePolicy {
        create_change_output: Some(true),
        change_output_public_key: Some(change_address),
        tx_default_fee: Some(request.fee),
    });
    Ok(params)
}

/// 送金元の全 UTXO を一つの出力にまとめるパラメータセットを生成する
pub fn consolidate_parameters(
    sender: &Sender,
    fee: u64,
    network: Network,
    chain: &dyn ChainInterface,
    keys: &dyn KeyProvider,
) -> Result<TransactionParameterSet, AppError> {
    let sender = resolve_sender(sender, network, keys)?;
    let utxos = chain.get_utxo(&sender.address)?;
    let total = utxos.iter().try_fold(0u64, |sum, u| sum.checked_add(u.value)).ok_or_else(|| {
        AppError::InputValidation(format!("UTXOの合計が上限を超えています: {}", sender.address))
    })?;
    log::info!("UTXO数: {}, 合計: {} sats", utxos.len(), total);
    if total <= fee {
        return Err(AppError::InsufficientFunds {
            available: total,
            required: fee.saturating_add(1),
        });
    }

    Ok(TransactionParameterSet {
        transactioninput: Some(input_records(&utxos, &sender.signing_key, chain)?),
        transactionoutput: Some(vec![TxOutputEntry {
            public_key: Some(sender.address.clone()),
            amount: Some(total - fee),
            op_return: Some(false),
            data_to_encode: String::new(),
            data_to_encode_file: false,
        }]),
        interface: Some(InterfaceConfig::for_network(network)),
        tx_info: Some(FeePolicy {
            create_change_output: Some(false),
            change_output_public_key: None,
            tx_default_fee: Some(fee),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockInterface;
    use crate::keys::{NetworkAddressResolver, Secp256k1KeyProvider};
    use crate::transaction::TransactionCompiler;
    use crate::types::Balance;
    use std::path::Path;

    const WIF: &str = "cVoVmd5zY69LEevwGa5iq1Ba3oBc6J8xxUqdKuJCtuFWUJJngPPP";
    const SENDER: &str = "mg7k4cWKZAH6dHFAk4GPjuWFvmFZBHKf7s";
    const RECIPIENT: &str = "mjK9HXAwspAu3YdmqZZ9JGDfbvfsorierQ";
    const FUNDING_TXID: &str = "ba37f74000558e145f1e1789c642fb69d2384b39211f4943c46de016f791451e";
    const FUNDING_TX: &str = "01000000015e0e47ce9c004147ca26a528edc09a2fd352e33bcb80b986685814580dba9840010000006b483045022100db2932276998523885af95f936f42c3465f15ec3449cf552b2e9f72a20a7cfa202200f530c5e6e4bd4bb1cee4f6faead4d33a5f7f3f37a9224889e93206517f609ce412103b4fb064ab28ec2daa9b162c6c4bcaf3cbacf5aa29e094c36fd9e302a9583f0eaffffffff02e8030000000000001976a9140694591e4bf16f2b2b64989192778e772d21f5d788ac34080000000000001976a9140694591e4bf16f2b2b64989192778e772d21f5d788ac00000000";

    fn chain() -> MockInterface {
        let utxo = |tx_pos, value| UnspentOutput {
            tx_hash: FUNDING_TXID.to_string(),
            tx_pos,
            value,
            height: Some(1631214),
        };
        MockInterface::new()
            .with_balance(SENDER, Balance { confirmed: 3100, unconfirmed: 0 })
            .with_utxos(SENDER, vec![utxo(0, 1000), utxo(1, 2100)])
            .with_raw_transaction(FUNDING_TXID, FUNDING_TX)
    }

    #[test]
    fn defaults_leave_placeholders() {
        let keys = Secp256k1KeyProvider::new();
        let request = PaymentRequest { fee: 300, ..Default::default() };
        let params = generate_parameters(&request, Network::Testnet, &chain(), &keys).unwrap();
        assert!(params.transactioninput.is_none());
        assert!(params.transactionoutput.is_none());
        let tx_info = params.tx_info.unwrap();
        assert_eq!(tx_info.change_output_public_key.as_deref(), Some(SENDER_ADDRESS_PLACEHOLDER));
        assert_eq!(tx_info.tx_default_fee, Some(300));
        assert_eq!(params.interface.unwrap().network_type, "testnet");
    }

    #[test]
    fn sender_address_selects_utxos_for_amount_plus_fee() {
        let keys = Secp256k1KeyProvider::new();
        let request = PaymentRequest {
            amount: Some(1000),
            sender: Some(Sender::Address(SENDER.to_string())),
            fee: 300,
            ..Default::default()
        };
        let params = generate_parameters(&request, Network::Mock, &chain(), &keys).unwrap();
        let inputs = params.transactioninput.unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].private_key_for_signing.as_deref(), Some(SIGNING_KEY_PLACEHOLDER));
        assert_eq!(inputs[1].amount, Some(2100));
        assert_eq!(inputs[0].input_tx_hash.as_deref(), Some(FUNDING_TX));
        assert_eq!(params.tx_info.unwrap().change_output_public_key.as_deref(), Some(SENDER));
    }

    #[test]
    fn generated_parameters_build_a_signed_transaction() {
        let keys = Secp256k1KeyProvider::new();
        let request = PaymentRequest {
            amount: Some(1000),
            sender: Some(Sender::Key(WIF.to_string())),
            recipient: Some(RECIPIENT.to_string()),
            fee: 300,
            ..Default::default()
        };
        let params = generate_parameters(&request, Network::Mock, &chain(), &keys).unwrap();
        assert_eq!(params.transactioninput.as_ref().unwrap()[0].private_key_for_signing.as_deref(), Some(WIF));

        let resolver = NetworkAddressResolver::new(Network::Mock);
        let compiler = TransactionCompiler::new(&resolver, &keys, Network::Mock, Path::new("."));
        let built = compiler.build(&params).unwrap();
        assert_eq!(built.report.total_in, 3100);
        assert_eq!(built.report.total_out, 1000);
        assert_eq!(built.report.change, 1800);
    }

    #[test]
    fn low_balance_is_insufficient_funds() {
        let keys = Secp256k1KeyProvider::new();
        let request = PaymentRequest {
            amount: Some(3000),
            sender: Some(Sender::Address(SENDER.to_string())),
            fee: 300,
            ..Default::default()
        };
        let err = generate_parameters(&request, Network::Mock, &chain(), &keys).unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { available: 3100, required: 3300 }));
    }

    #[test]
    fn oversized_request_is_rejected_without_wrapping() {
        let keys = Secp256k1KeyProvider::new();
        let request = PaymentRequest {
            amount: Some(u64::MAX),
            sender: Some(Sender::Address(SENDER.to_string())),
            fee: 300,
            ..Default::default()
        };
        let err = generate_parameters(&request, Network::Mock, &chain(), &keys).unwrap_err();
        assert!(matches!(err, AppError::InputValidation(_)));

        let request = PaymentRequest { amount: Some(i64::MAX as u64), ..request };
        let err = generate_parameters(&request, Network::Mock, &chain(), &keys).unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { available: 3100, .. }));
    }

    #[test]
    fn consolidation_spends_everything_back_to_sender() {
        let keys = Secp256k1KeyProvider::new();
        let params = consolidate_parameters(&Sender::Key(WIF.to_string()), 300, Network::Mock, &chain(), &keys).unwrap();
        assert_eq!(params.transactioninput.as_ref().unwrap().len(), 2);
        let output = &params.transactionoutput.as_ref().unwrap()[0];
        assert_eq!(output.public_key.as_deref(), Some(SENDER));
        assert_eq!(output.amount, Some(2800));
        assert_eq!(params.tx_info.as_ref().unwrap().create_change_output, Some(false));

        let resolver = NetworkAddressResolver::new(Network::Mock);
        let compiler = TransactionCompiler::new(&resolver, &keys, Network::Mock, Path::new("."));
        let built = compiler.build(&params).unwrap();
        assert_eq!(built.report.fee, 300);
        assert_eq!(built.report.change, 0);
    }

    #[test]
    fn consolidation_needs_more_than_the_fee() {
        let keys = Secp256k1KeyProvider::new();
        let err = consolidate_parameters(&Sender::Address("nobody".into()), 300, Network::Mock, &chain(), &keys).unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { available: 0, .. }));
    }
}
