use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::Log;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }

    #[sol(rpc)]
    interface PaymasterVault {
        event PaymentInitiated(
            address indexed payer,
            address indexed recipient,
            address indexed token,
            uint256 amount,
            bytes32 paymentId
        );

        function deposit(address token, uint256 amount, address recipient) external returns (uint256 depositId);
        function getTokenConfig(address token) external view returns (uint256 minAmount, uint256 maxAmount, bool enabled);
    }

    #[sol(rpc)]
    interface CrossChainPaymaster {
        function isPaymentProcessed(bytes32 paymentId) external view returns (bool);
        function roseUsdFeed() external view returns (address);
        function priceFeeds(address token) external view returns (address);
    }

    #[sol(rpc)]
    interface AggregatorV3 {
        function decimals() external view returns (uint8);
        function latestRoundData() external view returns (
            uint80 roundId,
            int256 answer,
            uint256 startedAt,
            uint256 updatedAt,
            uint80 answeredInRound
        );
    }
}

pub fn decode_payment_initiated(log: &Log) -> anyhow::Result<PaymasterVault::PaymentInitiated> {
    let decoded =
        PaymasterVault::PaymentInitiated::decode_raw_log(log.data.topics(), &log.data.data)?;
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, U256};

    #[test]
    fn decodes_payment_initiated_and_rejects_other_events() {
        let event = PaymasterVault::PaymentInitiated {
            payer: Address::repeat_byte(1),
            recipient: Address::repeat_byte(2),
            token: Address::repeat_byte(3),
            amount: U256::from(10_200_000u64),
            paymentId: B256::repeat_byte(9),
        };
        let log = Log {
            address: Address::repeat_byte(7),
            data: event.encode_log_data(),
        };
        let decoded = decode_payment_initiated(&log).unwrap();
        assert_eq!(decoded.amount, U256::from(10_200_000u64));
        assert_eq!(decoded.recipient, Address::repeat_byte(2));

        let unrelated = Log::new_unchecked(
            Address::repeat_byte(7),
            vec![B256::repeat_byte(0xaa)],
            Default::default(),
        );
        assert!(decode_payment_initiated(&unrelated).is_err());
    }
}
