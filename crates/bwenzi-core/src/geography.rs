// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Static Zambian geography and profiling data for registration menus.

/// A province with its selectable districts.
#[derive(Debug, Clone, Copy)]
pub struct Province {
    /// Province name as stored in member records.
    pub name: &'static str,
    /// Districts offered in the district menu, in display order.
    pub districts: &'static [&'static str],
}

/// The ten Zambian provinces, in menu order.
pub const PROVINCES: &[Province] = &[
    Province {
        name: "Central",
        districts: &["Kabwe", "Mumbwa", "Chibombo", "Kapiri Mposhi"],
    },
    Province {
        name: "Copperbelt",
        districts: &["Ndola", "Kitwe", "Chingola", "Mufulira"],
    },
    Province {
        name: "Eastern",
        districts: &["Chipata", "Petauke", "Katete", "Lundazi"],
    },
    Province {
        name: "Luapula",
        districts: &["Mansa", "Samfya", "Kawambwa", "Nchelenge"],
    },
    Province {
        name: "Lusaka",
        districts: &["Lusaka", "Kafue", "Chongwe", "Luangwa"],
    },
    Province {
        name: "Northern",
        districts: &["Kasama", "Mbala", "Mpika", "Chinsali"],
    },
    Province {
        name: "North-Western",
        districts: &["Solwezi", "Kasempa", "Zambezi"],
    },
    Province {
        name: "Southern",
        districts: &["Livingstone", "Choma", "Monze", "Mazabuka"],
    },
    Province {
        name: "Western",
        districts: &["Mongu", "Senanga", "Kaoma", "Sesheke"],
    },
    Province {
        name: "Muchinga",
        districts: &["Chama", "Isoka", "Nakonde", "Mafinga"],
    },
];

/// Business sectors offered to members who already run a business.
pub const BUSINESS_SECTORS: &[&str] = &[
    "Agriculture",
    "Transport",
    "Retail",
    "Services",
    "Technology",
    "Manufacturing",
    "Other",
];

/// Monthly revenue ranges for business profiling.
pub const REVENUE_RANGES: &[&str] = &[
    "Under K1,000",
    "K1,000 - K5,000",
    "K5,000 - K10,000",
    "K10,000 - K50,000",
    "Above K50,000",
];

/// Build the province selection menu.
pub fn province_menu() -> String {
    let mut menu = String::from("Step 4/6\nProvince:\n");
    for (i, province) in PROVINCES.iter().enumerate() {
        menu.push_str(&format!("{}. {}\n", i + 1, province.name));
    }
    menu
}

/// Build the district selection menu for a province.
pub fn district_menu(province: &Province) -> String {
    let mut menu = format!("Step 5/6\nDistrict in {}:\n", province.name);
    for (i, district) in province.districts.iter().enumerate() {
        menu.push_str(&format!("{}. {}\n", i + 1, district));
    }
    menu
}

/// Resolve a 1-based menu selection against the province list.
pub fn province_by_choice(input: &str) -> Option<(usize, &'static Province)> {
    let n: usize = input.trim().parse().ok()?;
    if n == 0 {
        return None;
    }
    PROVINCES.get(n - 1).map(|p| (n - 1, p))
}
