//! Content catalog: the projects the bot writes about and the accounts it
//! comments on.
//!
//! A built-in catalog ships with the binary. A JSON file with the same shape
//! can replace it:
//!
//! ```json
//! {
//!   "projects": [
//!     { "name": "Allora", "handle": "@AlloraNetwork", "website": "allora.network", "category": "AI + Blockchain" }
//!   ],
//!   "accounts": ["laurashin", "hosseeb"]
//! }
//! ```

use log::{info, warn};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{BotError, BotResult};

/// Projects posted about per cycle.
pub const PROJECTS_PER_CYCLE: usize = 2;

/// Accounts commented on per cycle.
pub const ACCOUNTS_PER_CYCLE: usize = 15;

/// A project the bot writes about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    /// X handle, including the leading `@`
    #[serde(alias = "twitter")]
    pub handle: String,
    pub website: String,
    pub category: String,
}

/// The most recent post found on a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPost {
    /// Absolute status URL
    pub url: String,
    pub text: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub projects: Vec<Project>,
    pub accounts: Vec<String>,
}

const BUILTIN_PROJECTS: &[(&str, &str, &str, &str)] = &[
    ("Allora", "@AlloraNetwork", "allora.network", "AI + Blockchain"),
    ("Caldera", "@Calderaxyz", "caldera.xyz", "Rollup Infrastructure"),
    ("Camp Network", "@campnetworkxyz", "campnetwork.xyz", "Social Layer"),
    ("Eclipse", "@EclipseFND", "eclipse.builders", "SVM L2"),
    ("Fogo", "@FogoChain", "fogo.io", "Gaming Chain"),
    ("Humanity Protocol", "@Humanityprot", "humanity.org", "Identity"),
    ("Hyperbolic", "@hyperbolic_labs", "hyperbolic.xyz", "AI Infrastructure"),
    ("Infinex", "@infinex", "infinex.xyz", "DeFi Frontend"),
    ("Irys", "@irys_xyz", "irys.xyz", "Data Storage"),
    ("Katana", "@KatanaRIPNet", "katana.network", "Gaming Infrastructure"),
    ("Lombard", "@Lombard_Finance", "lombard.finance", "Bitcoin DeFi"),
    ("MegaETH", "@megaeth_labs", "megaeth.com", "High-Performance L2"),
    ("Mira Network", "@mira_network", "mira.network", "Cross-Chain"),
    ("Mitosis", "@MitosisOrg", "mitosis.org", "Ecosystem Expansion"),
    ("Monad", "@monad_xyz", "monad.xyz", "Parallel EVM"),
    ("Multibank", "@multibank_io", "multibank.io", "Multi-Chain Banking"),
    ("Multipli", "@multiplifi", "multipli.fi", "Yield Optimization"),
    ("Newton", "@MagicNewton", "newton.xyz", "Cross-Chain Liquidity"),
    ("Novastro", "@Novastro_xyz", "novastro.xyz", "Cosmos DeFi"),
    ("Noya.ai", "@NetworkNoya", "noya.ai", "AI-Powered DeFi"),
    ("OpenLedger", "@OpenledgerHQ", "openledger.xyz", "Institutional DeFi"),
    ("PARADEX", "@tradeparadex", "paradex.trade", "Perpetuals DEX"),
    ("Portal to BTC", "@PortaltoBitcoin", "portaltobitcoin.com", "Bitcoin Bridge"),
    ("Puffpaw", "@puffpaw_xyz", "puffpaw.xyz", "Gaming + NFT"),
    ("SatLayer", "@satlayer", "satlayer.xyz", "Bitcoin L2"),
    ("Sidekick", "@Sidekick_Labs", "N/A", "Developer Tools"),
    ("Somnia", "@Somnia_Network", "somnia.network", "Virtual Society"),
    ("Soul Protocol", "@DigitalSoulPro", "digitalsoulprotocol.com", "Digital Identity"),
    ("Succinct", "@succinctlabs", "succinct.xyz", "Zero-Knowledge"),
    ("Symphony", "@SymphonyFinance", "app.symphony.finance", "Yield Farming"),
    ("Theoriq", "@theoriq_ai", "theoriq.ai", "AI Agents"),
    ("Thrive Protocol", "@thriveprotocol", "thriveprotocol.com", "Social DeFi"),
    ("Union", "@union_build", "union.build", "Cross-Chain Infrastructure"),
    ("YEET", "@yeet", "yeet.com", "Meme + Utility"),
];

const BUILTIN_ACCOUNTS: &[&str] = &[
    "0x_ultra",
    "0xBreadguy",
    "beast_ico",
    "mdudas",
    "lex_node",
    "jessepollak",
    "0xWenMoon",
    "ThinkingUSD",
    "udiWertheimer",
    "vohvohh",
    "NTmoney",
    "0xMert_",
    "QwQiao",
    "DefiIgnas",
    "notthreadguy",
    "Chilearmy123",
    "Punk9277",
    "DeeZe",
    "stevenyuntcap",
    "chefcryptoz",
    "ViktorBunin",
    "ayyyeandy",
    "andy8052",
    "Phineas_Sol",
    "MoonOverlord",
    "NarwhalTan",
    "theunipcs",
    "RyanWatkins_",
    "aixbt_agent",
    "ai_9684xtpa",
    "icebergy_",
    "Luyaoyuan1",
    "stacy_muur",
    "TheOneandOmsy",
    "jeffthedunker",
    "JoshuaDeuk",
    "0x_scientist",
    "inversebrah",
    "dachshundwizard",
    "gammichan",
    "sandeepnailwal",
    "segall_max",
    "blknoiz06",
    "0xmons",
    "hosseeb",
    "GwartyGwart",
    "JasonYanowitz",
    "Tyler_Did_It",
    "laurashin",
    "Dogetoshi",
    "benbybit",
    "MacroCRG",
    "Melt_Dem",
];

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Self {
        Catalog {
            projects: BUILTIN_PROJECTS
                .iter()
                .map(|(name, handle, website, category)| Project {
                    name: name.to_string(),
                    handle: handle.to_string(),
                    website: website.to_string(),
                    category: category.to_string(),
                })
                .collect(),
            accounts: BUILTIN_ACCOUNTS.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Reads a catalog from a JSON file.
    ///
    /// # Returns
    ///
    /// - `Ok(Catalog)`: If the file parses and lists at least one project or account
    /// - `Err(BotError)`: If the file is unreadable, malformed or empty
    pub fn from_file(path: &Path) -> BotResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut catalog: Catalog = serde_json::from_str(&content)?;
        for account in catalog.accounts.iter_mut() {
            *account = account.trim_start_matches('@').to_string();
        }
        if catalog.projects.is_empty() && catalog.accounts.is_empty() {
            return Err(BotError::Configuration(format!(
                "catalog {} lists no projects and no accounts",
                path.display()
            )));
        }
        info!(
            "Loaded catalog from {} ({} projects, {} accounts)",
            path.display(),
            catalog.projects.len(),
            catalog.accounts.len()
        );
        Ok(catalog)
    }

    /// Uses the file at `path` if given and valid, the built-in catalog otherwise.
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Catalog::from_file(path).unwrap_or_else(|e| {
                warn!(
                    "Could not load catalog from {}, using built-in catalog: {}",
                    path.display(),
                    e
                );
                Catalog::builtin()
            }),
            None => Catalog::builtin(),
        }
    }

    /// Up to `count` distinct projects in random order.
    pub fn pick_projects(&self, count: usize) -> Vec<Project> {
        self.projects
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect()
    }

    /// Up to `count` distinct accounts in random order.
    pub fn pick_accounts(&self, count: usize) -> Vec<String> {
        self.accounts
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect()
    }
}
