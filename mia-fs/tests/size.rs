use mia_fs::layout::{Ebr, Inode, Mbr, Slot, SuperBlock};
use mia_fs::BLOCK_SIZE;

#[test]
fn records() {
    assert_eq!(173, Mbr::SIZE);
    assert_eq!(39, Slot::SIZE);
    assert_eq!(30, Ebr::SIZE);
    assert_eq!(76, SuperBlock::SIZE);
    assert_eq!(100, Inode::SIZE);
    assert_eq!(64, BLOCK_SIZE);
}
