//! # 目录树
//!
//! 路径从根索引节点开始逐级解析：依次查找 12 个直接索引块，
//! 以及一级间接索引块所指向的块中的目录项。
//!
//! 目录增长：所有目录块都已满时分配新块，优先填入空闲的直接索引，
//! 直接索引用尽后填入一级间接索引块（首次使用时分配）。

use crate::error::{FsError, Result};
use crate::layout::{
    BlockId, FileBlock, FolderBlock, FolderEntry, Inode, InodeId, InodeKind, Link, Name,
    PointerBlock, SINGLE_INDIRECT,
};
use crate::volume::Volume;
use crate::{now, BLOCK_SIZE, DIRECT_COUNT, MAX_FILE_BLOCKS, NAME_LEN};

/// 目录中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub inode: InodeId,
    pub kind: InodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Folder,
    File,
    Pointer,
}

/// 数据块的归属，用于报表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockUse {
    pub block: BlockId,
    pub owner: InodeId,
    pub kind: BlockKind,
}

/// 拆分绝对路径；空的分量与`.`被忽略，不支持`..`
fn components(path: &str) -> Result<Vec<&str>> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| FsError::InvalidPath(path.to_owned()))?;

    let parts: Vec<&str> = rest
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    for part in &parts {
        if *part == ".." {
            return Err(FsError::InvalidPath(path.to_owned()));
        }
        Name::<NAME_LEN>::new(part)?;
    }

    Ok(parts)
}

fn prefix(parts: &[&str]) -> String {
    format!("/{}", parts.join("/"))
}

/// 索引节点占用的数据块：直接索引在前，一级间接索引在后
fn data_blocks(vol: &Volume, inode: &Inode) -> Result<Vec<BlockId>> {
    let mut blocks: Vec<BlockId> = inode.direct_blocks().collect();
    if let Some(pointer) = inode.single_indirect() {
        let pointers: PointerBlock = vol.read_block(pointer)?;
        blocks.extend(pointers.blocks());
    }
    Ok(blocks)
}

fn find_entry(vol: &Volume, folder: &Inode, name: &str) -> Result<Option<InodeId>> {
    for id in data_blocks(vol, folder)? {
        let block: FolderBlock = vol.read_block(id)?;
        if let Some(inode) = block.find(name) {
            return Ok(Some(inode));
        }
    }
    Ok(None)
}

/// 逐级解析，返回最后一个分量的索引节点
fn walk(vol: &Volume, parts: &[&str]) -> Result<(InodeId, Inode)> {
    let mut id = InodeId::ROOT;
    let mut inode = vol.read_inode(id)?;

    for (depth, part) in parts.iter().enumerate() {
        if !inode.is_folder() {
            return Err(FsError::NotDirectory(prefix(&parts[..depth])));
        }
        id = find_entry(vol, &inode, part)?
            .ok_or_else(|| FsError::NotFound(prefix(&parts[..=depth])))?;
        inode = vol.read_inode(id)?;
    }

    Ok((id, inode))
}

pub fn lookup(vol: &Volume, path: &str) -> Result<InodeId> {
    let parts = components(path)?;
    walk(vol, &parts).map(|(id, _)| id)
}

/// 解析父目录，`parents`为真时补齐缺失的中间目录
fn parent_of(vol: &mut Volume, parts: &[&str], parents: bool) -> Result<InodeId> {
    let mut id = InodeId::ROOT;

    for depth in 0..parts.len().saturating_sub(1) {
        let folder = vol.read_inode(id)?;
        if !folder.is_folder() {
            return Err(FsError::NotDirectory(prefix(&parts[..depth])));
        }
        id = match find_entry(vol, &folder, parts[depth])? {
            Some(child) => child,
            None if parents => create(vol, id, parts[depth], Content::Folder)?,
            None => return Err(FsError::NotFound(prefix(&parts[..=depth]))),
        };
    }

    if !vol.read_inode(id)?.is_folder() {
        return Err(FsError::NotDirectory(prefix(&parts[..parts.len() - 1])));
    }
    Ok(id)
}

/// `mkdir [-p]`：最后一个分量必须不存在
pub fn mkdir(vol: &mut Volume, path: &str, parents: bool) -> Result<InodeId> {
    let parts = components(path)?;
    let Some(name) = parts.last() else {
        return Err(FsError::Exists(path.to_owned()));
    };

    let parent = parent_of(vol, &parts, parents)?;
    let id = create(vol, parent, name, Content::Folder)?;
    log::info!("created folder {path:?} as inode {id} on {:?}", vol.name());
    Ok(id)
}

/// `mkfile [-r]`：内容依次写入直接索引块与一级间接索引块
pub fn mkfile(vol: &mut Volume, path: &str, parents: bool, content: &[u8]) -> Result<InodeId> {
    let parts = components(path)?;
    let Some(name) = parts.last() else {
        return Err(FsError::Exists(path.to_owned()));
    };
    check_file_len(content.len() as u64)?;

    let parent = parent_of(vol, &parts, parents)?;
    let id = create(vol, parent, name, Content::File(content))?;
    log::info!(
        "created file {path:?} ({} bytes) as inode {id} on {:?}",
        content.len(),
        vol.name()
    );
    Ok(id)
}

/// 文件内容最多占满直接索引块与一级间接索引块
pub fn check_file_len(len: u64) -> Result<()> {
    let max = MAX_FILE_BLOCKS * BLOCK_SIZE as usize;
    if len > max as u64 {
        return Err(FsError::FileTooLarge {
            len: usize::try_from(len).unwrap_or(usize::MAX),
            max,
        });
    }
    Ok(())
}

/// `-size=n`生成的内容：`0123456789`循环
pub fn digits(size: usize) -> Vec<u8> {
    b"0123456789".iter().copied().cycle().take(size).collect()
}

pub fn cat(vol: &Volume, path: &str) -> Result<Vec<u8>> {
    let parts = components(path)?;
    let (_, inode) = walk(vol, &parts)?;
    if inode.is_folder() {
        return Err(FsError::NotFile(path.to_owned()));
    }

    let mut content = Vec::with_capacity(inode.size as usize);
    for id in data_blocks(vol, &inode)? {
        let block: FileBlock = vol.read_block(id)?;
        content.extend_from_slice(&block.content);
    }
    content.truncate(inode.size as usize);
    Ok(content)
}

/// 目录内容，不含`.`与`..`
pub fn list(vol: &Volume, path: &str) -> Result<Vec<Entry>> {
    let parts = components(path)?;
    let (_, folder) = walk(vol, &parts)?;
    if !folder.is_folder() {
        return Err(FsError::NotDirectory(path.to_owned()));
    }

    let mut entries = Vec::new();
    for id in data_blocks(vol, &folder)? {
        let block: FolderBlock = vol.read_block(id)?;
        for entry in block.entries() {
            let name = entry.name.to_string();
            if name == "." || name == ".." {
                continue;
            }
            let inode = entry
                .inode
                .inode()
                .ok_or_else(|| FsError::Corrupted(format!("entry {name:?} has no inode")))?;
            let kind = vol.read_inode(inode)?.kind;
            entries.push(Entry { name, inode, kind });
        }
    }
    Ok(entries)
}

/// 已分配的索引节点，按编号排列
pub fn inodes(vol: &Volume) -> Result<Vec<(InodeId, Inode)>> {
    let map = vol.inode_bitmap().load(vol.image())?;
    map.iter()
        .enumerate()
        .filter(|(_, b)| **b == crate::bitmap::USED)
        .map(|(index, _)| {
            let id = InodeId::new(index as u32);
            vol.read_inode(id).map(|inode| (id, inode))
        })
        .collect()
}

/// 所有已分配索引节点能访问到的数据块。
/// 间接索引块指向的块按所属索引节点的类型归类。
pub fn reachable_blocks(vol: &Volume) -> Result<Vec<BlockUse>> {
    let mut uses = Vec::new();
    for (owner, inode) in inodes(vol)? {
        let kind = match inode.kind {
            InodeKind::Folder => BlockKind::Folder,
            InodeKind::File => BlockKind::File,
        };
        uses.extend(inode.direct_blocks().map(|block| BlockUse { block, owner, kind }));

        if let Some(pointer) = inode.single_indirect() {
            uses.push(BlockUse {
                block: pointer,
                owner,
                kind: BlockKind::Pointer,
            });
            let pointers: PointerBlock = vol.read_block(pointer)?;
            uses.extend(pointers.blocks().map(|block| BlockUse { block, owner, kind }));
        }
    }
    uses.sort_by_key(|u| u.block);
    Ok(uses)
}

enum Content<'a> {
    Folder,
    File(&'a [u8]),
}

/// 在`parent`下创建`name`。失败时归还已分配的索引节点与数据块。
fn create(vol: &mut Volume, parent: InodeId, name: &str, content: Content<'_>) -> Result<InodeId> {
    let mut folder = vol.read_inode(parent)?;
    if find_entry(vol, &folder, name)?.is_some() {
        return Err(FsError::Exists(name.to_owned()));
    }
    let name = Name::<NAME_LEN>::new(name)?;

    let id = vol.alloc_inode()?;
    let mut allocated = Vec::new();
    let entry = FolderEntry::new(name, id);
    let result = match fill(vol, id, parent, content, &mut allocated) {
        Ok(()) => insert_entry(vol, parent, &mut folder, entry, &mut allocated),
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        rollback(vol, id, &allocated);
        return Err(err);
    }

    vol.commit()?;
    Ok(id)
}

/// 写入新索引节点及其内容
fn fill(
    vol: &mut Volume,
    id: InodeId,
    parent: InodeId,
    content: Content<'_>,
    allocated: &mut Vec<BlockId>,
) -> Result<()> {
    let now = now();
    let inode = match content {
        Content::Folder => {
            let mut inode = Inode::new(InodeKind::Folder, now);
            let block = vol.alloc_block()?;
            allocated.push(block);
            vol.write_block(block, &FolderBlock::with_links(id, parent))?;
            inode.block[0] = block.into();
            inode
        }
        Content::File(bytes) => {
            let mut inode = Inode::new(InodeKind::File, now);
            write_content(vol, &mut inode, bytes, allocated)?;
            inode
        }
    };
    vol.write_inode(id, &inode)
}

fn write_content(
    vol: &mut Volume,
    inode: &mut Inode,
    bytes: &[u8],
    allocated: &mut Vec<BlockId>,
) -> Result<()> {
    let mut pointers = None;

    for (i, chunk) in bytes.chunks(BLOCK_SIZE as usize).enumerate() {
        if i == DIRECT_COUNT {
            let pointer = vol.alloc_block()?;
            allocated.push(pointer);
            inode.block[SINGLE_INDIRECT] = pointer.into();
            pointers = Some((pointer, PointerBlock::default()));
        }

        let block = vol.alloc_block()?;
        allocated.push(block);
        vol.write_block(block, &FileBlock::from_chunk(chunk))?;
        match pointers.as_mut() {
            Some((_, table)) => table.pointers[i - DIRECT_COUNT] = block.into(),
            None => inode.block[i] = block.into(),
        }
    }
    if let Some((pointer, table)) = pointers {
        vol.write_block(pointer, &table)?;
    }
    inode.size = bytes.len() as u32;

    Ok(())
}

/// 把目录项填入父目录第一个空位，没有空位时扩充父目录
fn insert_entry(
    vol: &mut Volume,
    parent: InodeId,
    folder: &mut Inode,
    entry: FolderEntry,
    allocated: &mut Vec<BlockId>,
) -> Result<()> {
    for id in data_blocks(vol, folder)? {
        let mut block: FolderBlock = vol.read_block(id)?;
        if let Some(free) = block.free_entry() {
            *free = entry;
            vol.write_block(id, &block)?;
            folder.touch(now());
            return vol.write_inode(parent, folder);
        }
    }

    let id = grow_folder(vol, parent, folder, allocated)?;
    let mut block = FolderBlock::default();
    block.content[0] = entry;
    vol.write_block(id, &block)?;
    folder.touch(now());
    vol.write_inode(parent, folder)
}

/// 为目录链接一个新的目录块
/// 新分配的块记入`allocated`，失败时一并归还
fn grow_folder(
    vol: &mut Volume,
    parent: InodeId,
    folder: &mut Inode,
    allocated: &mut Vec<BlockId>,
) -> Result<BlockId> {
    if let Some(slot) = folder.block[..DIRECT_COUNT].iter().position(|l| l.is_absent()) {
        let block = vol.alloc_block()?;
        allocated.push(block);
        folder.block[slot] = block.into();
        log::debug!("folder inode {parent} grows into direct slot {slot}: block {block}");
        return Ok(block);
    }

    match folder.single_indirect() {
        Some(pointer) => {
            let mut table: PointerBlock = vol.read_block(pointer)?;
            let slot = table
                .free_slot()
                .ok_or_else(|| FsError::FolderFull(format!("inode {parent}")))?;
            let block = vol.alloc_block()?;
            allocated.push(block);
            table.pointers[slot] = block.into();
            vol.write_block(pointer, &table)?;
            log::debug!("folder inode {parent} grows into indirect slot {slot}: block {block}");
            Ok(block)
        }
        None => {
            let pointer = vol.alloc_block()?;
            allocated.push(pointer);
            let block = vol.alloc_block()?;
            allocated.push(block);
            let mut table = PointerBlock::default();
            table.pointers[0] = block.into();
            vol.write_block(pointer, &table)?;
            folder.block[SINGLE_INDIRECT] = Link::from(pointer);
            log::debug!("folder inode {parent} takes pointer block {pointer}: block {block}");
            Ok(block)
        }
    }
}

fn rollback(vol: &mut Volume, inode: InodeId, blocks: &[BlockId]) {
    for &block in blocks {
        if let Err(err) = vol.free_block(block) {
            log::error!("failed to release block {block}: {err}");
        }
    }
    if let Err(err) = vol.free_inode(inode) {
        log::error!("failed to release inode {inode}: {err}");
    }
}
