//! Default microkernel boot
//!
//! Nodes without a binding network-boot the newest microkernel image and
//! check in from there.

use std::fmt::Write as _;

use provision_model::{ImageKind, ImageRecord};

use crate::config::ProvisionConfig;

/// Newest `mk` image by version
pub fn default_mk(images: &[ImageRecord]) -> Option<&ImageRecord> {
    images
        .iter()
        .filter(|img| img.kind == ImageKind::Mk)
        .max_by(|a, b| a.cmp_version(b))
}

/// iPXE script booting `mk`. Only `quiet` and `debug` pass through as the
/// debug level.
pub fn boot_script(mk: &ImageRecord, config: &ProvisionConfig) -> String {
    let image_uri = format!("{}/{}", config.image_svc_uri(ImageKind::Mk.as_str()), mk.uuid);
    let debug_level = config.rz_mk_boot_debug_level.as_str();
    let kernel_args = config.rz_mk_boot_kernel_args.as_str();
    let interval = config.mk_checkin_interval;

    let mut script = String::from("#!ipxe\n");
    let _ = write!(script, "kernel {image_uri}/{} maxcpus=1", mk.kernel);
    if matches!(debug_level, "quiet" | "debug") {
        let _ = write!(script, " {debug_level}");
    }
    if !kernel_args.is_empty() {
        let _ = write!(script, " {kernel_args}");
    }
    script.push_str(" || goto error\n");
    let _ = writeln!(script, "initrd {image_uri}/{} || goto error", mk.initrd);
    script.push_str("boot || goto error\n");
    script.push_str("\n\n\n");
    let _ = write!(
        script,
        ":error\necho ERROR, will reboot in {interval}\nsleep {interval}\nreboot\n"
    );
    script
}

/// Script served when a boot request cannot be answered
pub fn error_reboot_script(message: &str) -> String {
    format!("{message}\necho API Error, will reboot in 30 seconds\nsleep 30\nreboot\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(version: &str) -> ImageRecord {
        let mut img = ImageRecord::new(ImageKind::Mk, "rz_mk", version, "vmlinuz", "initrd.gz");
        img.uuid = format!("mk{}", version.replace('.', ""));
        img
    }

    #[test]
    fn test_boot_script_exact_format() {
        let config = ProvisionConfig::default();
        let script = boot_script(&mk("0.9.3"), &config);
        let uri = "http://127.0.0.1:8027/razor/image/mk/mk093";
        let expected = format!(
            "#!ipxe\nkernel {uri}/vmlinuz maxcpus=1 || goto error\ninitrd {uri}/initrd.gz || goto error\nboot || goto error\n\n\n\n:error\necho ERROR, will reboot in 60\nsleep 60\nreboot\n"
        );
        assert_eq!(script, expected);
    }

    #[test]
    fn test_boot_script_debug_level_filter_and_args() {
        let mut config = ProvisionConfig::default();
        config.rz_mk_boot_debug_level = "verbose".to_string();
        config.rz_mk_boot_kernel_args = "console=ttyS0".to_string();
        let script = boot_script(&mk("1.0"), &config);
        assert!(script.contains("maxcpus=1 console=ttyS0 || goto error"));

        config.rz_mk_boot_debug_level = "quiet".to_string();
        let script = boot_script(&mk("1.0"), &config);
        assert!(script.contains("maxcpus=1 quiet console=ttyS0 || goto error"));
    }

    #[test]
    fn test_default_mk_picks_highest_version() {
        let mut os = ImageRecord::new(ImageKind::Os, "suse", "12.9", "k", "i");
        os.uuid = "os".to_string();
        let images = vec![mk("0.9.3"), mk("0.10.0"), os, mk("0.9.12")];
        assert_eq!(default_mk(&images).map(|i| i.uuid.as_str()), Some("mk0100"));
        assert!(default_mk(&[]).is_none());
    }

    #[test]
    fn test_error_reboot_script() {
        assert_eq!(
            error_reboot_script("Bad JSON"),
            "Bad JSON\necho API Error, will reboot in 30 seconds\nsleep 30\nreboot\n"
        );
    }
}
