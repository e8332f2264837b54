use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
pub struct ItemId(pub u16);

impl ItemId {
    pub const IRON_SWORD: Self = Self(301);
    pub const IRON_HELMET: Self = Self(302);
    pub const IRON_CHESTPLATE: Self = Self(303);
    pub const IRON_LEGGINGS: Self = Self(304);
    pub const IRON_BOOTS: Self = Self(305);
    pub const BOW: Self = Self(306);
    pub const TORCH_ITEM: Self = Self(307);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemId,
    pub count: u8,
}

/// Worn and held items as last shown to an observer. Compared whole against
/// a fresh sample each tick; any difference triggers one equipment update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentState {
    pub main_hand: Option<ItemStack>,
    pub off_hand: Option<ItemStack>,
    pub head: Option<ItemStack>,
    pub chest: Option<ItemStack>,
    pub legs: Option<ItemStack>,
    pub feet: Option<ItemStack>,
}

impl EquipmentState {
    pub fn is_empty(&self) -> bool {
        self.main_hand.is_none()
            && self.off_hand.is_none()
            && self.head.is_none()
            && self.chest.is_none()
            && self.legs.is_none()
            && self.feet.is_none()
    }
}
