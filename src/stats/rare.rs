//! Rare-commodity override table (§4.6, §9 design note).
//!
//! Static data bundled with the binary, keyed lower-cased by commodity symbol, never updated
//! from upstream. Rare commodities get min=max=avg buy price straight from the data and a sell
//! price computed as buy + a fixed premium rather than the usual aggregate computation.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Flat credit premium applied to a rare commodity's buy price to derive its sell price
/// (§9: "sell prices computed as buy + fixed rare-goods premium" — the source's exact constant
/// isn't specified, this value is a deliberate placeholder kept stable across releases since the
/// sector-hash grid-size caveat applies here too: changing it retroactively changes history).
pub const RARE_GOODS_PREMIUM: i64 = 500;

pub struct RareCommodityInfo {
    pub display_name: &'static str,
    pub max_stock: i64,
}

static RARE_TABLE: Lazy<HashMap<&'static str, RareCommodityInfo>> = Lazy::new(|| {
    [
        ("leesti_fine_leather", RareCommodityInfo { display_name: "Leesti Fine Leather", max_stock: 357 }),
        ("eranin_pearl_whiskey", RareCommodityInfo { display_name: "Eranin Pearl Whiskey", max_stock: 238 }),
        ("azure_milk", RareCommodityInfo { display_name: "Azure Milk", max_stock: 357 }),
        ("centauri_mega_gin", RareCommodityInfo { display_name: "Centauri Mega Gin", max_stock: 360 }),
        ("wulpa_hyperbore_systems", RareCommodityInfo { display_name: "Wulpa Hyperbore Systems", max_stock: 248 }),
    ]
    .into_iter()
    .collect()
});

fn normalize(symbol: &str) -> String {
    symbol.trim().to_ascii_lowercase().replace(' ', "_")
}

pub fn lookup(symbol: &str) -> Option<&'static RareCommodityInfo> {
    RARE_TABLE.get(normalize(symbol).as_str())
}

pub fn is_rare(symbol: &str) -> bool {
    lookup(symbol).is_some()
}
