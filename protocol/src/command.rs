use crate::ProtocolError;
use std::fmt;

/// Closed set of request and reply kinds carried in the packet header.
///
/// The discriminant order is load-bearing: everything past `ConfigReply`
/// is an authenticated kind and must carry the UTXO preamble and a
/// signature trailer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum Command {
    Reply = 1,
    GetConfig = 2,
    ConfigReply = 3,
    GetBlockCount = 4,
    GetBlockHash = 5,
    GetBlock = 6,
    GetTransaction = 7,
    GetAllBlocks = 8,
    GetAllTransactions = 9,
    GetBalance = 10,
    GetBalanceUpdate = 11,
    GetTransactionsBloomFilter = 12,
    SendTransaction = 13,
    CustomCall = 14,
}

impl Command {
    pub fn from_u16(value: u16) -> Result<Self, ProtocolError> {
        use Command::*;
        Ok(match value {
            1 => Reply,
            2 => GetConfig,
            3 => ConfigReply,
            4 => GetBlockCount,
            5 => GetBlockHash,
            6 => GetBlock,
            7 => GetTransaction,
            8 => GetAllBlocks,
            9 => GetAllTransactions,
            10 => GetBalance,
            11 => GetBalanceUpdate,
            12 => GetTransactionsBloomFilter,
            13 => SendTransaction,
            14 => CustomCall,
            other => return Err(ProtocolError::UnknownCommand(other)),
        })
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// True for kinds that carry the UTXO preamble and signature trailer.
    pub fn requires_auth(self) -> bool {
        self > Command::ConfigReply
    }

    /// Stable name used in rate-limit keys and config paths.
    pub fn as_str(self) -> &'static str {
        use Command::*;
        match self {
            Reply => "Reply",
            GetConfig => "GetConfig",
            ConfigReply => "ConfigReply",
            GetBlockCount => "GetBlockCount",
            GetBlockHash => "GetBlockHash",
            GetBlock => "GetBlock",
            GetTransaction => "GetTransaction",
            GetAllBlocks => "GetAllBlocks",
            GetAllTransactions => "GetAllTransactions",
            GetBalance => "GetBalance",
            GetBalanceUpdate => "GetBalanceUpdate",
            GetTransactionsBloomFilter => "GetTransactionsBloomFilter",
            SendTransaction => "SendTransaction",
            CustomCall => "CustomCall",
        }
    }

    pub const ALL: [Command; 14] = [
        Command::Reply,
        Command::GetConfig,
        Command::ConfigReply,
        Command::GetBlockCount,
        Command::GetBlockHash,
        Command::GetBlock,
        Command::GetTransaction,
        Command::GetAllBlocks,
        Command::GetAllTransactions,
        Command::GetBalance,
        Command::GetBalanceUpdate,
        Command::GetTransactionsBloomFilter,
        Command::SendTransaction,
        Command::CustomCall,
    ];
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
