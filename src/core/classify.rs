// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::{
    defs,
    fstab::{Fstab, FstabEntry},
};

/// First candidate, in table order, whose mount point strictly contains `entry`'s.
///
/// Candidates are assumed not to overlap; if two of them wrap the same entry the
/// earlier row is returned without any attempt to pick the deeper one.
pub fn wrapped_entry<'a>(candidates: &'a Fstab, entry: &FstabEntry) -> Option<&'a FstabEntry> {
    let mount_point = entry.system_mount_point();
    candidates.iter().find(|candidate| {
        mount_point
            .strip_prefix(candidate.system_mount_point())
            .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Whether `entry` may be switched to read-write directly.
pub fn is_remountable(candidates: &Fstab, entry: &FstabEntry) -> bool {
    let flags = &entry.fs_mgr_flags;
    if flags.vold_managed || flags.recovery_only || flags.slot_select_other {
        return false;
    }
    if !entry.is_read_only() {
        return false;
    }
    if entry.fs_type == defs::REMOVABLE_FS_TYPE {
        return false;
    }
    if let Some(candidate) = candidates.entry_for_mount_point(&entry.mount_point) {
        return candidate.fs_type == entry.fs_type;
    }
    wrapped_entry(candidates, entry).is_none()
}

#[cfg(test)]
mod tests {
    use nix::mount::MsFlags;
    use proptest::prelude::*;

    use super::*;

    fn ro(mount_point: &str, fs_type: &str) -> FstabEntry {
        FstabEntry::new("/dev/block/dm-0", mount_point, fs_type, MsFlags::MS_RDONLY)
    }

    fn table(entries: &[FstabEntry]) -> Fstab {
        entries.iter().cloned().collect()
    }

    #[test]
    fn root_is_matched_as_system() {
        let candidates = table(&[ro("/", "erofs")]);

        let wrapped = wrapped_entry(&candidates, &ro("/system/vendor", "ext4"));
        assert_eq!(wrapped.map(|e| e.mount_point.as_str()), Some("/"));

        assert!(wrapped_entry(&candidates, &ro("/system", "ext4")).is_none());
        assert!(wrapped_entry(&candidates, &ro("/systemx", "ext4")).is_none());
    }

    #[test]
    fn first_wrapping_candidate_wins() {
        let candidates = table(&[ro("/mnt", "erofs"), ro("/mnt/vendor", "erofs")]);
        let wrapped = wrapped_entry(&candidates, &ro("/mnt/vendor/persist", "ext4"));
        assert_eq!(wrapped.map(|e| e.mount_point.as_str()), Some("/mnt"));
    }

    #[test]
    fn classifier_rules() {
        let candidates = table(&[ro("/vendor", "erofs"), ro("/product", "erofs")]);

        assert!(is_remountable(&candidates, &ro("/vendor", "erofs")));
        assert!(!is_remountable(&candidates, &ro("/vendor", "ext4")));
        assert!(!is_remountable(&candidates, &ro("/product/app", "ext4")));
        assert!(is_remountable(&candidates, &ro("/odm", "ext4")));
        assert!(!is_remountable(&candidates, &ro("/sdcard", "vfat")));

        let rw = FstabEntry::new("/dev/block/dm-1", "/data", "f2fs", MsFlags::empty());
        assert!(!is_remountable(&candidates, &rw));
    }

    fn arb_entry() -> impl Strategy<Value = FstabEntry> {
        (
            prop::sample::select(vec!["/", "/system", "/vendor", "/vendor/dsp", "/odm", "/product"]),
            prop::sample::select(vec!["ext4", "erofs", "vfat", "f2fs"]),
            any::<bool>(),
            any::<[bool; 3]>(),
        )
            .prop_map(|(mount_point, fs_type, read_only, [vold, recovery, other])| {
                let flags = if read_only {
                    MsFlags::MS_RDONLY
                } else {
                    MsFlags::empty()
                };
                let mut entry = FstabEntry::new("/dev/block/x", mount_point, fs_type, flags);
                entry.fs_mgr_flags.vold_managed = vold;
                entry.fs_mgr_flags.recovery_only = recovery;
                entry.fs_mgr_flags.slot_select_other = other;
                entry
            })
    }

    proptest! {
        #[test]
        fn excluded_flags_are_never_remountable(
            candidates in prop::collection::vec(arb_entry(), 0..5),
            entry in arb_entry(),
        ) {
            let candidates: Fstab = candidates.into_iter().collect();
            let flags = &entry.fs_mgr_flags;
            if flags.vold_managed || flags.recovery_only || flags.slot_select_other {
                prop_assert!(!is_remountable(&candidates, &entry));
            }
        }

        #[test]
        fn wrapped_is_first_strict_ancestor(
            candidates in prop::collection::vec(arb_entry(), 0..5),
            entry in arb_entry(),
        ) {
            let candidates: Fstab = candidates.into_iter().collect();
            let mount_point = entry.system_mount_point().to_string();
            let expected = candidates
                .iter()
                .position(|c| mount_point.starts_with(&format!("{}/", c.system_mount_point())));
            let actual = wrapped_entry(&candidates, &entry)
                .map(|w| candidates.iter().position(|c| std::ptr::eq(c, w)).unwrap());
            prop_assert_eq!(actual, expected);
        }
    }
}
