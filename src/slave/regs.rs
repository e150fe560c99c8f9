// Licensed under the Apache-2.0 license

//! HPI register space.
//!
//! The slave keeps a RAM image of every register the EC can address. The
//! images are packed to match the wire layout exactly, so serving a read
//! is a bounds-checked window into the image bytes. Addresses decode as
//! `section | memory part | offset`: the top nibble selects the register
//! section, the next nibble the memory part within it, and the low byte
//! the offset (the UCSI section uses the full low 12 bits as offset).

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::slave::common::{
    RegPart, RegSection, MAX_FLASH_ROW_SIZE, MAX_PD_PORTS, PORT_USERDEF_REG_COUNT,
    UCSI_REG_OFFSET_MASK, USERDEF_REG_COUNT,
};

/// Size of the per-port read/write data memories in bytes.
pub const PD_DATA_MEM_SIZE: usize = 256;

/// Device section register image, offsets 0x00-0x7F.
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct DevRegisters {
    /// 00h - Device operation mode.
    pub device_mode: u8,
    /// 01h - Reason for Boot mode operation.
    pub boot_mode_reason: u8,
    /// 03:02h - Device silicon ID.
    pub silicon_id: u16,
    /// 05:04h - Last flash row occupied by the bootloader.
    pub bl_last_row: u16,
    /// 06h - Interrupt status.
    pub intr_stat: u8,
    /// 07h - Jump to boot or alternate firmware request.
    pub jump_to_boot: u8,
    /// 09:08h - Device/I2C reset request.
    pub reset_rqt: u16,
    /// 0Ah - Enter flashing mode request.
    pub enter_flash: u8,
    /// 0Bh - Validate firmware image request.
    pub validate_fw: u8,
    /// 0F:0Ch - Flash read/write request.
    pub flash_read_write: u32,
    /// 1F:10h - Bootloader and FW1 version records.
    pub dev_version: [u8; 16],
    /// 27:20h - FW2 version record.
    pub fw_2_version: [u8; 8],
    /// 2B:28h - Firmware binary locations.
    pub fw_bin_loc: [u16; 2],
    /// 2Ch - PD port enable bit mask.
    pub port_enable: u8,
    /// 2Dh - Deep Sleep enable/disable.
    pub sleep_ctrl: u8,
    /// 2Eh - System power status.
    pub power_stat: u8,
    /// 2Fh - Application boot priority.
    pub set_app_priority: u8,
    /// 30h - Customer-specific information.
    pub read_customer_info: u8,
    /// 31h - Current battery status.
    pub battery_stat: u8,
    /// 32h - Watchdog reset count since startup.
    pub wd_reset_count: u8,
    /// 33h - Die and silicon information.
    pub read_die_info: u8,
    /// 37:34h - HPI library and feature support, extended.
    pub hpi_vers_ext: u32,
    /// 38h - UCSI status.
    pub ucsi_status: u8,
    /// 39h - UCSI control.
    pub ucsi_control: u8,
    /// 3Ah - Config table version supported by firmware.
    pub cfgtab_vers: u8,
    /// 3Bh - System power state received from the EC.
    pub syspwr_state: u8,
    /// 3F:3Ch - HPI version and feature support.
    pub hpi_vers: u32,
    /// 4F:40h - User-specific register space.
    pub userdef_regs: [u8; USERDEF_REG_COUNT],
    /// 50h - Billboard reset control.
    pub bb_disable_reset: u8,
    /// 51h - Reserved.
    pub reserved_51: u8,
    /// 53:52h - Alternate mode status for Billboard enumeration.
    pub bb_altmode_status: u16,
    /// 54h - Billboard operating model.
    pub bb_oper_model: u8,
    /// 55h - Billboard additional failure information.
    pub bb_addl_fail_info: u8,
    /// 56h - Billboard command register.
    pub bb_cmd_reg: u8,
    /// 57h - Billboard misc information.
    pub bb_misc_info: u8,
    /// 5F:58h - Billboard bootloader version.
    pub bb_bl_version: [u8; 8],
    /// 67:60h - Billboard firmware version.
    pub bb_fw_version: [u8; 8],
    /// 6F:68h - Reserved.
    pub reserved_68: [u8; 8],
    /// 71:70h - PPS design voltage.
    pub pps_design_voltage: u16,
    /// 72h - FW update lock state.
    pub fw_update_lock: u8,
    /// 73h - Device control.
    pub dev_control: u8,
    /// 7D:74h - Reserved.
    pub reserved_74: [u8; 10],
    /// 7Eh - Response code.
    pub response: u8,
    /// 7Fh - Response data length.
    pub response_length: u8,
}

/// Per-port register image, offsets 0x00-0x6F.
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct PortRegisters {
    pub vdm_ctrl: u16,
    pub eff_src_pdo_mask: u8,
    pub eff_sink_pdo_mask: u8,
    pub src_pdo_select: u8,
    pub sink_pdo_select: u8,
    pub pd_ctrl: u8,
    pub reserved_07: u8,
    pub pd_status: u32,
    pub type_c_status: u8,
    pub bus_voltage: u16,
    pub reserved_0f: u8,
    pub cur_pdo: u32,
    pub cur_rdo: u32,
    pub cable_vdo: u32,
    pub alt_mode: u32,
    pub app_hw: u32,
    pub event_mask: u32,
    pub swap_response: u8,
    pub active_ec_modes: u8,
    pub vdm_ec_ctrl: u8,
    pub alt_mode_status: u8,
    pub bc12_control: u8,
    pub reserved_2d: [u8; 3],
    pub pd_cmd_timeout: u8,
    pub frs_enable: u8,
    pub vbus_cfet_ctrl: u8,
    pub bc12_status: u8,
    pub intr_status: u32,
    pub port_user_reg: [u8; PORT_USERDEF_REG_COUNT],
    pub act_cbl_vdo_2: u32,
    pub sink_rdo_request: u32,
    pub bus_current: u8,
    pub reserved_59: [u8; 3],
    pub host_cap_control: u8,
    pub reserved_5d: [u8; 3],
    pub dfp_alt_mode_mask: u8,
    pub ufp_alt_mode_mask: u8,
    pub custom_alt_mode_svid: u16,
    pub epr_src_pdo_select: u8,
    pub epr_snk_pdo_select: u8,
    pub reserved_66: [u8; 2],
    pub sink_pps_avs_ctrl: u32,
    pub moisture_status: u8,
    pub reserved_6d: [u8; 3],
}

// Wire layouts are load-bearing: the EC addresses these images byte-wise.
const _: () = assert!(core::mem::size_of::<DevRegisters>() == 0x80);
const _: () = assert!(core::mem::size_of::<PortRegisters>() == 0x70);

/// RAM copy of all HPI registers and data memories.
pub struct RegSpace {
    /// Device section register image.
    pub dev: DevRegisters,
    /// Flash read/write scratch memory.
    pub flash_mem: [u8; MAX_FLASH_ROW_SIZE],
    /// Port section register images.
    pub port: [PortRegisters; MAX_PD_PORTS],
    read_mem: [[u8; PD_DATA_MEM_SIZE]; MAX_PD_PORTS],
    write_mem: [[u8; PD_DATA_MEM_SIZE]; MAX_PD_PORTS],
}

impl Default for RegSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl RegSpace {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dev: DevRegisters::new_zeroed(),
            flash_mem: [0; MAX_FLASH_ROW_SIZE],
            port: [PortRegisters::new_zeroed(); MAX_PD_PORTS],
            read_mem: [[0; PD_DATA_MEM_SIZE]; MAX_PD_PORTS],
            write_mem: [[0; PD_DATA_MEM_SIZE]; MAX_PD_PORTS],
        }
    }

    /// Decode a 16-bit register address into section, memory part, and
    /// offset. The UCSI section uses the low 12 bits as offset.
    #[must_use]
    pub fn decode(addr: u16) -> Option<(RegSection, RegPart, u16)> {
        let section = RegSection::from_u8((addr >> 12) as u8)?;
        if section == RegSection::Ucsi {
            return Some((section, RegPart::Reg, addr & UCSI_REG_OFFSET_MASK));
        }
        let part = RegPart::from_u8(((addr >> 8) & 0xF) as u8)?;
        Some((section, part, addr & 0xFF))
    }

    /// Window the EC may read starting at the given location, running to
    /// the end of the addressed region. Empty when the location does not
    /// resolve to readable memory; the transport pads short reads.
    #[must_use]
    pub fn read_window(&self, section: RegSection, part: RegPart, offset: u16) -> &[u8] {
        let offset = usize::from(offset);
        let region: &[u8] = match (section, part) {
            (RegSection::Dev, RegPart::Reg) => self.dev.as_bytes(),
            (RegSection::Dev, RegPart::Flash) => &self.flash_mem,
            (RegSection::Port0 | RegSection::Port1, RegPart::Reg) => {
                match self.port_index(section) {
                    Some(p) => self.port.get(p).map(|r| r.as_bytes()).unwrap_or(&[]),
                    None => &[],
                }
            }
            (RegSection::Port0 | RegSection::Port1, RegPart::PdDataRead) => {
                match self.port_index(section) {
                    Some(p) => self.read_mem.get(p).map(|m| m.as_slice()).unwrap_or(&[]),
                    None => &[],
                }
            }
            _ => &[],
        };
        region.get(offset..).unwrap_or(&[])
    }

    fn port_index(&self, section: RegSection) -> Option<usize> {
        section.port().map(usize::from)
    }

    /// Mutable byte view of the device register image.
    pub fn dev_bytes_mut(&mut self) -> &mut [u8] {
        self.dev.as_mut_bytes()
    }

    /// Mutable byte view of a port register image.
    pub fn port_bytes_mut(&mut self, port: u8) -> Option<&mut [u8]> {
        self.port
            .get_mut(usize::from(port))
            .map(|r| r.as_mut_bytes())
    }

    /// Store EC-written bytes into a port write data memory.
    pub fn store_write_mem(&mut self, port: u8, offset: u16, data: &[u8]) {
        if let Some(mem) = self.write_mem.get_mut(usize::from(port)) {
            let offset = usize::from(offset);
            for (i, byte) in data.iter().enumerate() {
                if let Some(slot) = mem.get_mut(offset + i) {
                    *slot = *byte;
                }
            }
        }
    }

    /// Port write data memory contents.
    #[must_use]
    pub fn write_mem(&self, port: u8) -> &[u8] {
        self.write_mem
            .get(usize::from(port))
            .map(|m| m.as_slice())
            .unwrap_or(&[])
    }

    /// Stage response payload bytes in a port read data memory. Returns
    /// the number of bytes staged.
    pub fn stage_read_payload(&mut self, port: u8, data: &[u8]) -> usize {
        let Some(mem) = self.read_mem.get_mut(usize::from(port)) else {
            return 0;
        };
        let n = data.len().min(mem.len());
        for (dst, src) in mem.iter_mut().zip(data.iter()) {
            *dst = *src;
        }
        n
    }

    /// Write raw bytes into a register image region, clamped to the
    /// region bounds. Used for application-side register updates.
    pub fn update(&mut self, section: RegSection, offset: u16, data: &[u8]) {
        let region: &mut [u8] = match section {
            RegSection::Dev => self.dev.as_mut_bytes(),
            RegSection::Port0 | RegSection::Port1 => {
                let Some(p) = section.port() else { return };
                match self.port.get_mut(usize::from(p)) {
                    Some(port) => port.as_mut_bytes(),
                    None => return,
                }
            }
            _ => return,
        };
        let offset = usize::from(offset);
        for (i, byte) in data.iter().enumerate() {
            if let Some(slot) = region.get_mut(offset + i) {
                *slot = *byte;
            }
        }
    }
}
