use crate::Error;
use bech32::Bech32m;
use bech32::Hrp;
use bitcoin::key::TweakedPublicKey;
use bitcoin::Network;
use bitcoin::ScriptBuf;
use bitcoin::XOnlyPublicKey;
use std::fmt;
use std::str::FromStr;

/// An Ark address: the server's x-only public key together with the Taproot
/// output key of the VTXO, encoded as bech32m with HRP `ark` on mainnet and
/// `tark` everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArkAddress {
    hrp: Hrp,
    server: XOnlyPublicKey,
    vtxo_tap_key: TweakedPublicKey,
}

const MAINNET_HRP: &str = "ark";
const TESTNET_HRP: &str = "tark";

impl ArkAddress {
    pub fn new(network: Network, server: XOnlyPublicKey, vtxo_tap_key: TweakedPublicKey) -> Self {
        let hrp = match network {
            Network::Bitcoin => MAINNET_HRP,
            _ => TESTNET_HRP,
        };

        let hrp = Hrp::parse_unchecked(hrp);

        Self {
            hrp,
            server,
            vtxo_tap_key,
        }
    }

    pub fn server_pk(&self) -> XOnlyPublicKey {
        self.server
    }

    pub fn vtxo_tap_key(&self) -> TweakedPublicKey {
        self.vtxo_tap_key
    }

    pub fn to_p2tr_script_pubkey(self) -> ScriptBuf {
        ScriptBuf::new_p2tr_tweaked(self.vtxo_tap_key)
    }

    pub fn encode(&self) -> String {
        let mut bytes = [0u8; 64];

        bytes[..32].copy_from_slice(&self.server.serialize());
        bytes[32..].copy_from_slice(&self.vtxo_tap_key.serialize());

        bech32::encode::<Bech32m>(self.hrp, bytes.as_slice()).expect("valid bech32m payload")
    }

    pub fn decode(value: &str) -> Result<Self, Error> {
        let (hrp, bytes) = bech32::decode(value)
            .map_err(|e| Error::address(format!("failed to decode Ark address: {e}")))?;

        let hrp_str = hrp.as_str();
        if hrp_str != MAINNET_HRP && hrp_str != TESTNET_HRP {
            return Err(Error::address(format!(
                "unexpected Ark address HRP: {hrp_str}"
            )));
        }

        if bytes.len() != 64 {
            return Err(Error::address(format!(
                "unexpected Ark address payload length: {}",
                bytes.len()
            )));
        }

        let server = XOnlyPublicKey::from_slice(&bytes[..32])
            .map_err(|e| Error::address(format!("invalid server key in Ark address: {e}")))?;

        let vtxo_tap_key = XOnlyPublicKey::from_slice(&bytes[32..])
            .map_err(|e| Error::address(format!("invalid output key in Ark address: {e}")))?;

        // The output key was tweaked by whoever constructed the address.
        let vtxo_tap_key = TweakedPublicKey::dangerous_assume_tweaked(vtxo_tap_key);

        Ok(Self {
            hrp,
            server,
            vtxo_tap_key,
        })
    }
}

impl fmt::Display for ArkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for ArkAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
