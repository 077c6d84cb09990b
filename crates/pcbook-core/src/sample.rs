//! Random laptop generator.
//!
//! Produces plausible, fully populated [`Laptop`] records for tests, benches
//! and the demo client. Every generated laptop carries a fresh UUID.

use std::time::SystemTime;

use prost_types::Timestamp;
use rand::{Rng, seq::IndexedRandom};

use crate::proto::{
    Cpu, Gpu, Keyboard, Laptop, Memory, Screen, Storage, keyboard::Layout, laptop::Weight,
    memory::Unit, screen::Panel, screen::Resolution, storage::Driver,
};

pub fn new_keyboard() -> Keyboard {
    let mut rng = rand::rng();
    Keyboard {
        layout: *[Layout::Qwerty, Layout::Qwertz, Layout::Azerty]
            .choose(&mut rng)
            .unwrap_or(&Layout::Qwerty) as i32,
        backlit: rng.random_bool(0.5),
    }
}

pub fn new_cpu() -> Cpu {
    let mut rng = rand::rng();
    let (brand, names): (&str, &[&str]) = if rng.random_bool(0.5) {
        (
            "Intel",
            &[
                "Xeon E-2286M",
                "Core i9-9980HK",
                "Core i7-9750H",
                "Core i5-9400F",
                "Core i3-1005G1",
            ],
        )
    } else {
        (
            "AMD",
            &[
                "Ryzen 7 PRO 2700U",
                "Ryzen 5 PRO 3500U",
                "Ryzen 3 PRO 3200GE",
            ],
        )
    };

    let number_cores = rng.random_range(2..=8);
    let number_threads = rng.random_range(number_cores..=12);
    let min_ghz = rng.random_range(2.0..3.5);
    let max_ghz = rng.random_range(min_ghz..5.0);

    Cpu {
        brand: brand.to_string(),
        name: pick(names),
        number_cores,
        number_threads,
        min_ghz,
        max_ghz,
    }
}

pub fn new_gpu() -> Gpu {
    let mut rng = rand::rng();
    let (brand, names): (&str, &[&str]) = if rng.random_bool(0.5) {
        ("Nvidia", &["RTX 2060", "RTX 2070", "GTX 1660-Ti", "GTX 1070"])
    } else {
        ("AMD", &["RX 590", "RX 580", "RX 5700-XT", "RX Vega-56"])
    };

    let min_ghz = rng.random_range(1.0..1.5);
    let max_ghz = rng.random_range(min_ghz..2.0);

    Gpu {
        brand: brand.to_string(),
        name: pick(names),
        min_ghz,
        max_ghz,
        memory: Some(memory(rng.random_range(2..=6), Unit::Gigabyte)),
    }
}

pub fn new_ram() -> Memory {
    memory(rand::rng().random_range(4..=64), Unit::Gigabyte)
}

pub fn new_ssd() -> Storage {
    Storage {
        driver: Driver::Ssd as i32,
        memory: Some(memory(rand::rng().random_range(128..=1024), Unit::Gigabyte)),
    }
}

pub fn new_hdd() -> Storage {
    Storage {
        driver: Driver::Hdd as i32,
        memory: Some(memory(rand::rng().random_range(1..=6), Unit::Terabyte)),
    }
}

pub fn new_screen() -> Screen {
    let mut rng = rand::rng();
    let height = rng.random_range(1080..=4320);
    let width = height * 16 / 9;

    Screen {
        size_inch: rng.random_range(13.0..17.0),
        resolution: Some(Resolution { width, height }),
        panel: if rng.random_bool(0.5) {
            Panel::Ips as i32
        } else {
            Panel::Oled as i32
        },
        multitouch: rng.random_bool(0.5),
    }
}

/// Generates a laptop with a fresh random identifier.
pub fn new_laptop() -> Laptop {
    let mut rng = rand::rng();
    let (brand, names): (&str, &[&str]) = match rng.random_range(0..3) {
        0 => ("Apple", &["Macbook Air", "Macbook Pro"]),
        1 => ("Dell", &["Latitude", "Vostro", "XPS", "Alienware"]),
        _ => ("Lenovo", &["Thinkpad X1", "Thinkpad P1", "Thinkpad P53"]),
    };

    Laptop {
        id: uuid::Uuid::new_v4().to_string(),
        brand: brand.to_string(),
        name: pick(names),
        cpu: Some(new_cpu()),
        ram: Some(new_ram()),
        gpus: vec![new_gpu()],
        storages: vec![new_ssd(), new_hdd()],
        screen: Some(new_screen()),
        keyboard: Some(new_keyboard()),
        weight: Some(Weight::WeightKg(rng.random_range(1.0..3.0))),
        price_inr: rng.random_range(50_000.0..150_000.0),
        release_year: rng.random_range(2015..=2024),
        updated_at: Some(Timestamp::from(SystemTime::now())),
    }
}

/// A score between 1 and 10 inclusive.
pub fn random_score() -> f64 {
    f64::from(rand::rng().random_range(1..=10u8))
}

fn memory(value: u64, unit: Unit) -> Memory {
    Memory {
        value,
        unit: unit as i32,
    }
}

fn pick(names: &[&str]) -> String {
    names
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or_default()
        .to_string()
}
