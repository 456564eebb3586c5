//! 模块数据绑定
//!
//! 把映射文件挂到模块导入描述符上，供引擎在扫描期间读取辅助数据。
//! 绑定句柄独占映射；释放句柄即解除映射。
use std::borrow::Cow;
use std::ffi::{c_void, CString};
use std::path::Path;
use std::ptr;

use tracing::{debug, info, warn};

use crate::config::ModuleDataConfig;
use crate::error::{Error, Result};
use crate::ffi::{c_text, RawModuleImport};
use crate::mapped::MappedFile;

/// 一次成功绑定所持有的资源
#[derive(Debug)]
pub struct ModuleData {
    mapped: MappedFile,
}

impl ModuleData {
    pub fn path(&self) -> &Path {
        self.mapped.path()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mapped.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.mapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapped.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.mapped.as_slice()
    }
}

/// 映射 `path` 并写入模块的数据指针与长度
///
/// 描述符为空时立即失败，不打开任何文件；映射失败时描述符保持原样。
pub fn bind(module: Option<&mut RawModuleImport>, path: impl AsRef<Path>) -> Result<ModuleData> {
    let Some(module) = module else {
        warn!("bind called without a module import descriptor");
        return Err(Error::ModuleAbsent);
    };
    let path = path.as_ref();
    let mapped = MappedFile::open(path).map_err(|e| {
        warn!(path = %path.display(), error = %e, "could not map module data");
        e
    })?;
    module.module_data = mapped.as_ptr() as *mut c_void;
    module.module_data_size = mapped.len();
    debug!(path = %path.display(), size = mapped.len(), "module data bound");
    Ok(ModuleData { mapped })
}

/// 释放绑定；空句柄什么也不做
///
/// 描述符中的指针不会被清除，调用方须保证引擎此后不再读取它（见 [`ModuleSlot`]）。
pub fn unbind(handle: Option<ModuleData>) {
    if let Some(data) = handle {
        debug!(path = %data.path().display(), "module data released");
        data.mapped.close();
    }
}

/// 读取模块名
///
/// # Safety
/// `module_name` 为空或指向 `'a` 内有效的 NUL 结尾字符串。
pub unsafe fn module_name<'a>(module: Option<&'a RawModuleImport>) -> Option<Cow<'a, str>> {
    unsafe { c_text(module?.module_name) }
}

/// 自有的模块导入描述符（不经引擎时使用，如命令行与测试）
#[derive(Debug)]
pub struct ModuleImport {
    name: CString,
    raw: RawModuleImport,
}

impl ModuleImport {
    pub fn new(name: &str) -> Result<Self> {
        let name = CString::new(name).map_err(|_| Error::InvalidModuleName(name.to_string()))?;
        // CString 的缓冲区在堆上，移动 ModuleImport 不影响该指针
        let raw = RawModuleImport {
            module_name: name.as_ptr(),
            module_data: ptr::null_mut(),
            module_data_size: 0,
        };
        Ok(Self { name, raw })
    }

    pub fn name(&self) -> &str {
        self.name.to_str().unwrap_or_default()
    }

    pub fn as_raw(&self) -> &RawModuleImport {
        &self.raw
    }

    pub fn as_raw_mut(&mut self) -> &mut RawModuleImport {
        &mut self.raw
    }

    /// 当前写入的数据指针与长度
    pub fn data(&self) -> (*const c_void, usize) {
        (self.raw.module_data, self.raw.module_data_size)
    }
}

/// 单个模块槽位的作用域拥有者
///
/// 重新加载前先释放旧数据；卸载时清空描述符的数据指针；drop 时自动卸载。
#[derive(Debug)]
pub struct ModuleSlot<'m> {
    module: &'m mut RawModuleImport,
    data: Option<ModuleData>,
}

impl<'m> ModuleSlot<'m> {
    /// # Safety
    /// `module.module_name` 为空或指向在 `'m` 内有效的 NUL 结尾字符串。
    pub unsafe fn new(module: &'m mut RawModuleImport) -> Self {
        Self { module, data: None }
    }

    pub fn name(&self) -> Option<Cow<'_, str>> {
        // SAFETY: new 的约定
        unsafe { module_name(Some(&*self.module)) }
    }

    pub fn load_data(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.unload_data();
        let data = bind(Some(&mut *self.module), path)?;
        self.data = Some(data);
        Ok(())
    }

    pub fn unload_data(&mut self) {
        if let Some(data) = self.data.take() {
            // 先断开引擎可见的指针，再解除映射
            self.module.module_data = ptr::null_mut();
            self.module.module_data_size = 0;
            unbind(Some(data));
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&ModuleData> {
        self.data.as_ref()
    }
}

impl Drop for ModuleSlot<'_> {
    fn drop(&mut self) {
        self.unload_data();
    }
}

#[derive(Debug)]
struct BoundModule {
    import: ModuleImport,
    data: ModuleData,
}

impl Drop for BoundModule {
    fn drop(&mut self) {
        self.import.raw.module_data = ptr::null_mut();
        self.import.raw.module_data_size = 0;
        // data 随后按字段顺序析构并解除映射
    }
}

/// 按配置批量绑定的模块数据
///
/// 任一模块绑定失败时，已绑定的模块全部释放后返回错误。
#[derive(Debug, Default)]
pub struct ModuleDataSet {
    bound: Vec<BoundModule>,
}

impl ModuleDataSet {
    pub fn bind_all(config: &ModuleDataConfig) -> Result<Self> {
        let mut bound = Vec::with_capacity(config.len());
        for entry in config.entries() {
            let mut import = ModuleImport::new(&entry.name)?;
            let data = bind(Some(import.as_raw_mut()), &entry.path)?;
            bound.push(BoundModule { import, data });
        }
        let set = Self { bound };
        info!(modules = set.len(), bytes = set.total_size(), "module data set bound");
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// 按模块名查找已绑定的描述符
    pub fn import(&self, name: &str) -> Option<&ModuleImport> {
        self.bound.iter().map(|b| &b.import).find(|i| i.name() == name)
    }

    pub fn data(&self, name: &str) -> Option<&ModuleData> {
        self.bound.iter().find(|b| b.import.name() == name).map(|b| &b.data)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.bound.iter().map(|b| b.import.name())
    }

    pub fn total_size(&self) -> usize {
        self.bound.iter().map(|b| b.data.len()).sum()
    }
}
