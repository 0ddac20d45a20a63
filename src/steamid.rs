//! # Steam Identifiers
//!
//! A steam id packs four components into 64 bits:
//!
//! | bits  | component    |
//! |-------|--------------|
//! | 56-63 | universe     |
//! | 52-55 | account type |
//! | 32-51 | instance     |
//! | 0-31  | account id   |
//!
//! [`SteamId`] wraps the raw 64-bit value, so converting to and from u64 is
//! exact for every input.

use std::fmt;

/// Universe an account lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Universe {
    Invalid,
    Public,
    Beta,
    Internal,
    Dev,
    Max,
}

impl Universe {
    pub fn code(self) -> u8 {
        match self {
            Universe::Invalid => 0,
            Universe::Public => 1,
            Universe::Beta => 2,
            Universe::Internal => 3,
            Universe::Dev => 4,
            Universe::Max => 5,
        }
    }

    /// Unknown codes map to `Invalid`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Universe::Public,
            2 => Universe::Beta,
            3 => Universe::Internal,
            4 => Universe::Dev,
            5 => Universe::Max,
            _ => Universe::Invalid,
        }
    }
}

/// Kind of account an id names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Invalid,
    Individual,
    Multiseat,
    GameServer,
    AnonGameServer,
    Pending,
    ContentServer,
    Clan,
    Chat,
    AnonUser,
}

impl AccountType {
    pub fn code(self) -> u8 {
        match self {
            AccountType::Invalid => 0,
            AccountType::Individual => 1,
            AccountType::Multiseat => 2,
            AccountType::GameServer => 3,
            AccountType::AnonGameServer => 4,
            AccountType::Pending => 5,
            AccountType::ContentServer => 6,
            AccountType::Clan => 7,
            AccountType::Chat => 8,
            AccountType::AnonUser => 10,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => AccountType::Individual,
            2 => AccountType::Multiseat,
            3 => AccountType::GameServer,
            4 => AccountType::AnonGameServer,
            5 => AccountType::Pending,
            6 => AccountType::ContentServer,
            7 => AccountType::Clan,
            8 => AccountType::Chat,
            10 => AccountType::AnonUser,
            _ => AccountType::Invalid,
        }
    }
}

/// Well-known instance values. The field is 20 bits wide; values other than
/// these appear on chat ids.
pub mod instance {
    pub const ALL: u32 = 0;
    pub const DESKTOP: u32 = 1;
    pub const CONSOLE: u32 = 2;
    pub const WEB: u32 = 4;
}

const ACCOUNT_ID_MASK: u64 = 0xFFFF_FFFF;
const INSTANCE_MASK: u64 = 0x000F_FFFF;

/// A 64-bit steam id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SteamId(u64);

impl SteamId {
    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }

    /// Compose an id from its four components.
    pub fn from_parts(
        universe: Universe,
        account_type: AccountType,
        instance: u32,
        account_id: u32,
    ) -> Self {
        Self(
            (u64::from(universe.code()) << 56)
                | (u64::from(account_type.code()) << 52)
                | ((u64::from(instance) & INSTANCE_MASK) << 32)
                | (u64::from(account_id) & ACCOUNT_ID_MASK),
        )
    }

    /// Fresh anonymous-user id in the public universe, account id zero. The
    /// server assigns the real id at logon.
    pub fn anonymous() -> Self {
        Self::from_parts(
            Universe::Public,
            AccountType::AnonUser,
            instance::DESKTOP,
            0,
        )
    }

    pub fn universe(self) -> Universe {
        Universe::from_code((self.0 >> 56) as u8)
    }

    pub fn account_type(self) -> AccountType {
        AccountType::from_code(((self.0 >> 52) & 0x0F) as u8)
    }

    pub fn instance(self) -> u32 {
        ((self.0 >> 32) & INSTANCE_MASK) as u32
    }

    pub fn account_id(self) -> u32 {
        (self.0 & ACCOUNT_ID_MASK) as u32
    }
}

impl From<u64> for SteamId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<SteamId> for u64 {
    fn from(id: SteamId) -> u64 {
        id.0
    }
}

impl fmt::Debug for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SteamId")
            .field("universe", &self.universe())
            .field("account_type", &self.account_type())
            .field("instance", &self.instance())
            .field("account_id", &self.account_id())
            .field("steam_id64", &self.0)
            .finish()
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_conversion_is_a_bijection() {
        for raw in [
            0u64,
            76561197960265728,
            76561197960287930,
            u64::MAX,
            0x0110_0001_0000_0000,
        ] {
            assert_eq!(SteamId::from_u64(raw).to_u64(), raw);
        }
    }

    #[test]
    fn parts_decompose_a_known_id() {
        // Public-universe individual desktop account 22202.
        let id = SteamId::from_u64(76561197960287930);
        assert_eq!(id.universe(), Universe::Public);
        assert_eq!(id.account_type(), AccountType::Individual);
        assert_eq!(id.instance(), instance::DESKTOP);
        assert_eq!(id.account_id(), 22202);
        assert_eq!(
            SteamId::from_parts(
                Universe::Public,
                AccountType::Individual,
                instance::DESKTOP,
                22202
            ),
            id
        );
    }

    #[test]
    fn anonymous_id_has_expected_shape() {
        let id = SteamId::anonymous();
        assert_eq!(id.universe(), Universe::Public);
        assert_eq!(id.account_type(), AccountType::AnonUser);
        assert_eq!(id.account_id(), 0);
    }

    #[test]
    fn instance_is_clamped_to_twenty_bits() {
        let id = SteamId::from_parts(
            Universe::Public,
            AccountType::Chat,
            0xFFFF_FFFF,
            1,
        );
        assert_eq!(id.instance(), 0x000F_FFFF);
        assert_eq!(id.account_type(), AccountType::Chat);
    }

    #[test]
    fn unknown_codes_fall_back_to_invalid() {
        assert_eq!(Universe::from_code(99), Universe::Invalid);
        assert_eq!(AccountType::from_code(9), AccountType::Invalid);
    }
}
