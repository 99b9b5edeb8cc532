use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default_input: bool,
    pub is_default_output: bool,
}

pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();

    let default_in  = host.default_input_device().map(|d| d.name().unwrap_or_default());
    let default_out = host.default_output_device().map(|d| d.name().unwrap_or_default());

    let mut out = Vec::new();

    if let Ok(devices) = host.devices() {
        for dev in devices {
            let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
            let is_def_in  = default_in.as_ref().map(|n| n == &name).unwrap_or(false);
            let is_def_out = default_out.as_ref().map(|n| n == &name).unwrap_or(false);
            out.push(DeviceInfo {
                is_input: can_capture(&dev),
                is_output: can_render(&dev),
                name,
                is_default_input: is_def_in,
                is_default_output: is_def_out,
            });
        }
    }
    Ok(out)
}

/// Pretty-print for CLI
pub fn print_devices() -> Result<()> {
    let list = list_devices()?;
    if list.is_empty() {
        println!("(no devices found)");
        return Ok(());
    }
    for (i, d) in list.iter().enumerate() {
        let mut marks = String::new();
        if d.is_default_input { marks.push_str("*I"); }
        if d.is_default_output { if !marks.is_empty() { marks.push(' '); } marks.push_str("*O"); }
        let dir = match (d.is_input, d.is_output) {
            (true, true) => "in/out",
            (true, false) => "in",
            (false, true) => "out",
            (false, false) => "-",
        };
        if !marks.is_empty() { print!("[{marks}] "); }
        println!("{:>2}  {:<6}  {}", i, dir, d.name);
    }
    Ok(())
}

fn can_capture(dev: &cpal::Device) -> bool {
    dev.supported_input_configs().map(|mut c| c.next().is_some()).unwrap_or(false)
}

fn can_render(dev: &cpal::Device) -> bool {
    dev.supported_output_configs().map(|mut c| c.next().is_some()).unwrap_or(false)
}

/* ---------- device picking (by name or index) ---------- */

/// Index counts only devices that support the wanted direction. Name is a
/// case-insensitive substring. Falls back to the host default.
pub(crate) fn pick_device(
    host: &cpal::Host,
    want_input: bool,
    name_substr: Option<&str>,
    index: Option<usize>,
) -> crate::Result<Option<cpal::Device>> {
    let capable = |dev: &cpal::Device| if want_input { can_capture(dev) } else { can_render(dev) };

    // Try explicit index first
    if let Some(idx) = index {
        if let Some(dev) = host.devices()?.filter(|d| capable(d)).nth(idx) {
            debug!(index = idx, input = want_input, "device picked by index");
            return Ok(Some(dev));
        }
        // fallthrough to name/default if index not found
    }

    // Then try substring match
    if let Some(q) = name_substr {
        let qn = q.to_lowercase();
        for dev in host.devices()? {
            let name = dev.name().unwrap_or_default();
            if name.to_lowercase().contains(&qn) && capable(&dev) {
                debug!(%name, input = want_input, "device picked by name");
                return Ok(Some(dev));
            }
        }
    }

    // Fallback to default
    Ok(if want_input { host.default_input_device() } else { host.default_output_device() })
}
