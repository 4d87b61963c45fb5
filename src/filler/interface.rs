//! 接口（和类型）填充器：先解析具体类型，再填写对应实现帧

use super::{FillerId, Grow};
use crate::core::DialogError;
use crate::engine::{dangling, Dialog};
use crate::filler::FillerKind;

impl<'a> Dialog<'a> {
    fn interface_parts(&self, id: FillerId) -> Result<(FillerId, Option<FillerId>), DialogError> {
        match &self.node(id)?.kind {
            FillerKind::Interface(i) => Ok((i.real_type, i.variant)),
            _ => Err(dangling(id)),
        }
    }

    pub(crate) fn is_interface_done(&self, id: FillerId) -> Result<bool, DialogError> {
        let (real_type, variant) = self.interface_parts(id)?;
        // 用户对类型说「都行」：不再追问实现
        if self.session.arena.entity(real_type).is_some_and(|e| e.dont_care) {
            return Ok(true);
        }
        match variant {
            Some(v) => self.is_done(v),
            None => Ok(false),
        }
    }

    pub(crate) fn grow_interface(&mut self, id: FillerId) -> Result<Grow, DialogError> {
        let (real_type, variant) = self.interface_parts(id)?;
        if !self.is_done(real_type)? {
            return Ok(Grow::Push(real_type));
        }
        let variant = match variant {
            Some(v) => v,
            None => {
                let Some(chosen) = self.session.arena.entity(real_type).and_then(|e| e.value.clone()) else {
                    return Ok(Grow::Blocked);
                };
                tracing::debug!("Interface {} resolved to {}", id, chosen);
                self.build_variant(id, &chosen)?
            }
        };
        if self.is_done(variant)? {
            Ok(Grow::Blocked)
        } else {
            Ok(Grow::Push(variant))
        }
    }

    pub(crate) fn clear_interface(&mut self, id: FillerId) -> Result<(), DialogError> {
        let (real_type, variant) = self.interface_parts(id)?;
        self.clear_entity(real_type)?;
        if let Some(v) = variant {
            self.session.arena.remove_tree(v);
            if let Some(FillerKind::Interface(i)) = self.session.arena.get_mut(id).map(|n| &mut n.kind) {
                i.variant = None;
            }
        }
        Ok(())
    }
}
