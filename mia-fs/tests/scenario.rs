use mia_fs::layout::{Fit, Mbr};
use mia_fs::{
    fdisk, mkdisk, rmdisk, FdiskRequest, FsError, ImageError, MountTable, SizeUnit,
    DEFAULT_OPERATOR_ID,
};

#[test]
fn disco() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("home").join("disco.mia");

    let image = mkdisk(&path, 3000, SizeUnit::Kilo, Fit::First).unwrap();
    assert_eq!(3_072_000, image.len().unwrap());

    let part1 = fdisk(&FdiskRequest::new(&path, 1000, "Part1")).unwrap();
    assert_eq!(1_024_000, part1.size);
    assert_eq!(Mbr::SIZE, part1.start);

    let mut table = MountTable::new(DEFAULT_OPERATOR_ID);
    let id = table.mount(&path, "Part1").unwrap();
    assert!(!id.is_empty());
    {
        let listing: Vec<_> = table.mounted().collect();
        assert_eq!(1, listing.len());
        let (entry, partition) = &listing[0];
        assert_eq!(id, entry.id);
        assert_eq!(path, entry.path);
        assert!(partition.as_ref().unwrap().name.matches("Part1"));
    }

    rmdisk(&path).unwrap();
    assert!(!path.exists());
    assert!(matches!(
        table.mount(&path, "Part1"),
        Err(FsError::Image(ImageError::NotFound(_)))
    ));
    assert!(table.mounted().all(|(_, partition)| partition.is_err()));
}

#[test]
fn rmdisk_requires_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disco.img");
    std::fs::write(&path, [0u8; 512]).unwrap();

    assert!(matches!(
        rmdisk(&path),
        Err(FsError::Image(ImageError::BadExtension(_)))
    ));
    assert!(path.exists());
}

#[test]
fn garbage_is_not_a_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zero.mia");
    std::fs::write(&path, vec![0u8; 4096]).unwrap();

    let mut table = MountTable::new(DEFAULT_OPERATOR_ID);
    assert!(matches!(
        table.mount(&path, "Part1"),
        Err(FsError::Image(ImageError::Codec(_)))
    ));
}
