use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

fn find_device(devices: impl Iterator<Item = Device>, target: &str) -> Option<Device> {
    devices.into_iter().find(|d| d.name().is_ok_and(|name| name == target))
}

pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("no default input device")),
        Some(target) => find_device(host.input_devices()?, &target)
            .ok_or_else(|| anyhow::anyhow!("input device {:?} not found", target)),
    }
}

pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no default output device")),
        Some(target) => find_device(host.output_devices()?, &target)
            .ok_or_else(|| anyhow::anyhow!("output device {:?} not found", target)),
    }
}

fn describe(name: String, channels: u16, sample_rate: u32, default_name: &str) -> String {
    let mut d = format!(" * {}({}ch, {}hz)", name, channels, sample_rate);
    if name == default_name {
        d.push_str(" [default]");
    }
    d
}

pub fn get_available_inputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let mut device_names = Vec::new();
    for device in host.input_devices()? {
        let Ok(name) = device.name() else { continue };
        match device.default_input_config() {
            Ok(cfg) => device_names.push(describe(name, cfg.channels(), cfg.sample_rate().0, &default_name)),
            Err(e) => tracing::debug!("skipping input {}: {}", name, e),
        }
    }
    Ok(device_names.join("\n"))
}

pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let mut device_names = Vec::new();
    for device in host.output_devices()? {
        let Ok(name) = device.name() else { continue };
        match device.default_output_config() {
            Ok(cfg) => device_names.push(describe(name, cfg.channels(), cfg.sample_rate().0, &default_name)),
            Err(e) => tracing::debug!("skipping output {}: {}", name, e),
        }
    }
    Ok(device_names.join("\n"))
}
