//! Connection Packer (§4.3).
//!
//! Two phases: a plausibility check over the declarative catalog, then a
//! byte-by-byte MDT/AT layout pass that assigns every active connection a
//! `(telegram_no, byte_offset)` and derives the per-cycle producer bitmap.

use std::collections::HashSet;

use crate::error::{CoreError, ConfigErrorKind, ErrorLocation};
use crate::limits::{
    CDEV_SLOT_LEN, EF_FIELD_LEN, EF_FIELD_LEN_COMPAT, HP_FIELD_LEN, MAX_TEL, MIN_TELEGRAM_LENGTH,
    SDEV_SLOT_LEN, SERC3_MAX_DATA_LENGTH, SVC_SLOT_LEN,
};
use crate::model::{Assigned, Configuration, Connection, Direction, MasterParticipant, Role, Slave, TelegramLayout};

/// Options that vary the packer's behavior (§4.3, §9 Open Questions).
#[derive(Debug, Clone, Copy)]
pub struct PackerOptions {
    /// "hot-plug-in-all-telegrams" compatibility flag: when set, every
    /// telegram opened on wrap gets its own 6-byte HP field (MDT) and the
    /// MDT0 extended-function field grows from 4 to 6 bytes.
    pub hotplug_in_all_telegrams: bool,
    /// Whether the master is allowed to produce connections in AT
    /// (§4.3 AT pass step 4, compile-time optional upstream; a runtime
    /// knob here).
    pub master_may_produce_at: bool,
}

impl Default for PackerOptions {
    fn default() -> Self {
        Self {
            hotplug_in_all_telegrams: false,
            master_may_produce_at: false,
        }
    }
}

/// Pre-ordered connection-index groups for the MDT pass, in the exact
/// traversal order the wire layout must follow.
#[derive(Debug, Clone, Default)]
pub struct MdtConnectionGroups {
    /// Master-produced connections, in master-configured order.
    pub master_produced: Vec<u16>,
}

/// Pre-ordered connection-index groups for the AT pass (§4.3 AT pass steps
/// 3, 4, 6). CC-ness and master-consumption are catalog properties the
/// caller already knows when building these groups.
#[derive(Debug, Clone, Default)]
pub struct AtConnectionGroups {
    pub cc_consumed_by_master: Vec<u16>,
    pub cc_not_consumed_by_master: Vec<u16>,
    pub master_produced: Vec<u16>,
    pub slave_produced_non_cc: Vec<u16>,
}

/// Everything the MDT/AT layout pass produces.
#[derive(Debug, Clone, Default)]
pub struct PackResult {
    pub mdt_layouts: Vec<TelegramLayout>,
    pub at_layouts: Vec<TelegramLayout>,
    /// S-0-1013: `(telNo << 12) | offset` per slave, MDT SVC slot.
    pub svc_mdt_s_0_1013: Vec<u16>,
    /// S-0-1009 per slave, MDT C-DEV slot.
    pub cdev_s_0_1009: Vec<u16>,
    /// S-0-1014 per slave, AT SVC slot.
    pub svc_at_s_0_1014: Vec<u16>,
    /// S-0-1011 per slave, AT S-DEV slot.
    pub sdev_s_0_1011: Vec<u16>,
    /// Last slave index whose S-DEV still fits in each AT telegram.
    pub last_slave_per_at: [Option<u16>; MAX_TEL],
}

/// Runs the plausibility check (§4.3 "Plausibility check before packing").
pub fn plausibility_check(
    connections: &[Connection],
    configurations: &[Configuration],
    slaves: &[Slave],
    master: &MasterParticipant,
    tscyc_ns: u32,
    master_may_produce_at: bool,
) -> Result<(), CoreError> {
    let n_conn = connections.len();
    let n_conf = configurations.len();

    // The master's own catalog entries share the same arena and are
    // checked the same way as a slave's (§3 Master configuration: "identical
    // shape" to a slave's view), keyed by the sentinel slave index NO_INDEX.
    let master_as_pseudo_slave = std::iter::once((crate::limits::NO_INDEX, &master.connections[..]));

    for (slave_index, entries) in slaves
        .iter()
        .map(|s| (s.index, &s.connections[..]))
        .chain(master_as_pseudo_slave)
    {
        for (ci, entry) in entries.iter().enumerate() {
            if entry.connection_index as usize >= n_conn || entry.configuration_index as usize >= n_conf {
                return Err(CoreError::config(
                    ConfigErrorKind::WrongConnectionIndex,
                    ErrorLocation::connection(slave_index, ci as u16),
                ));
            }
            let config = &configurations[entry.configuration_index as usize];
            if !matches!(config.role, Role::Producer | Role::Consumer | Role::Unused) {
                return Err(CoreError::config(
                    ConfigErrorKind::ConfigurationNotConfigured,
                    ErrorLocation::connection(slave_index, entry.connection_index),
                ));
            }
            let conn = &connections[entry.connection_index as usize];
            if config.role == Role::Producer && conn.direction == Direction::Mdt && slave_index != crate::limits::NO_INDEX {
                return Err(CoreError::config(
                    ConfigErrorKind::SlaveProduceInMdt,
                    ErrorLocation::connection(slave_index, entry.connection_index),
                ));
            }
        }
    }

    if !master_may_produce_at {
        for conn in connections {
            if conn.direction == Direction::At && conn.produced_by_master {
                return Err(CoreError::config(
                    ConfigErrorKind::MasterProduceInAt,
                    ErrorLocation::none(),
                ));
            }
        }
    }

    let mut seen_numbers: HashSet<u16> = HashSet::new();
    for conn in connections {
        if conn.payload_len < 2 {
            return Err(CoreError::config(
                ConfigErrorKind::ConnectionLength0,
                ErrorLocation::none(),
            ));
        }
        if conn.producer_cycle_ns != 0 && conn.producer_cycle_ns % tscyc_ns != 0 {
            return Err(CoreError::config(
                ConfigErrorKind::ProdCycTimeInvalid,
                ErrorLocation::none(),
            ));
        }
        if !seen_numbers.insert(conn.connection_number) {
            return Err(CoreError::config(
                ConfigErrorKind::NoUniqueConnNbr,
                ErrorLocation::none(),
            ));
        }
    }

    // Every active connection is produced exactly once and has >=1 consumer.
    for (idx, _conn) in connections.iter().enumerate() {
        let mut producers = 0usize;
        let mut consumers = 0usize;
        for config in configurations {
            if config.connection_index as usize == idx {
                match config.role {
                    Role::Producer => producers += 1,
                    Role::Consumer => consumers += 1,
                    Role::Unused => {}
                }
            }
        }
        if producers == 0 && consumers > 0 {
            return Err(CoreError::config(
                ConfigErrorKind::ConnectionNotProduced,
                ErrorLocation::none(),
            ));
        }
        if producers > 0 && consumers == 0 {
            return Err(CoreError::config(
                ConfigErrorKind::ConnectionNotConsumed,
                ErrorLocation::none(),
            ));
        }
    }

    Ok(())
}

/// Byte-offset cursor shared by the MDT and AT passes.
struct Cursor {
    layouts: Vec<TelegramLayout>,
    tel_no: usize,
    offset: u16,
    hotplug_in_all_telegrams: bool,
}

enum Field {
    Hp,
    Ef,
    Svc,
    Rtd,
    /// CC connection consumed by a slave only; folds into `rtd` for the
    /// telegram total but is also tallied separately (§3 Telegram layout).
    Cc,
    /// CC connection also consumed by the master.
    CcM,
}

impl Cursor {
    fn new(hotplug_in_all_telegrams: bool) -> Self {
        Self {
            layouts: vec![TelegramLayout::default()],
            tel_no: 0,
            offset: 0,
            hotplug_in_all_telegrams,
        }
    }

    fn current_total(&self) -> u16 {
        self.layouts[self.tel_no].tel()
    }

    /// Reserves `len` bytes of `field`, wrapping to a new telegram (padding
    /// the old one to the 40-byte minimum) if it would not fit. Returns
    /// `(telegram_no, byte_offset)` of the start of the reservation.
    fn reserve(&mut self, field: Field, len: u16, open_hp_on_wrap: bool, err: ConfigErrorKind) -> Result<(u8, u16), CoreError> {
        if usize::from(self.current_total()) + usize::from(len) > SERC3_MAX_DATA_LENGTH {
            self.close_current();
            self.tel_no += 1;
            if self.tel_no >= MAX_TEL {
                return Err(CoreError::config(err, ErrorLocation::none()));
            }
            self.layouts.push(TelegramLayout::default());
            self.offset = 0;
            if open_hp_on_wrap && self.hotplug_in_all_telegrams {
                self.add(Field::Hp, HP_FIELD_LEN as u16);
            }
        }
        let start = self.offset;
        self.add(field, len);
        Ok((self.tel_no as u8, start))
    }

    fn add(&mut self, field: Field, len: u16) {
        let layout = &mut self.layouts[self.tel_no];
        match field {
            Field::Hp => layout.hp += len,
            Field::Ef => layout.ef += len,
            Field::Svc => layout.svc += len,
            Field::Rtd => layout.rtd += len,
            Field::Cc => {
                layout.cc += len;
                layout.rtd += len;
            }
            Field::CcM => {
                layout.cc_m += len;
                layout.rtd += len;
            }
        }
        self.offset += len;
    }

    fn close_current(&mut self) {
        let layout = &mut self.layouts[self.tel_no];
        if layout.tel() < MIN_TELEGRAM_LENGTH as u16 {
            layout.rtd += MIN_TELEGRAM_LENGTH as u16 - layout.tel();
        }
    }

    fn finish(mut self) -> Vec<TelegramLayout> {
        self.close_current();
        self.layouts
    }
}

/// Lays out the MDT pass (§4.3 "MDT pass").
pub fn pack_mdt(
    slaves: &[Slave],
    connections: &mut [Connection],
    groups: &MdtConnectionGroups,
    options: &PackerOptions,
) -> Result<(Vec<TelegramLayout>, Vec<u16>, Vec<u16>), CoreError> {
    let mut cursor = Cursor::new(options.hotplug_in_all_telegrams);

    // Step 1: HP + EF in telegram 0.
    cursor.add(Field::Hp, HP_FIELD_LEN as u16);
    let ef_len = if options.hotplug_in_all_telegrams {
        EF_FIELD_LEN_COMPAT
    } else {
        EF_FIELD_LEN
    };
    cursor.add(Field::Ef, ef_len as u16);

    // Step 2: per-slave SVC slot -> S-0-1013.
    let mut svc_offsets = Vec::with_capacity(slaves.len());
    for _slave in slaves {
        let (tel_no, offset) = cursor.reserve(Field::Svc, SVC_SLOT_LEN as u16, true, ConfigErrorKind::TelNbrMdtRtd)?;
        svc_offsets.push((u16::from(tel_no) << 12) | offset);
    }

    // Step 3: per-slave C-DEV slot -> S-0-1009.
    let mut cdev_offsets = Vec::with_capacity(slaves.len());
    for _slave in slaves {
        let (tel_no, offset) = cursor.reserve(Field::Rtd, CDEV_SLOT_LEN as u16, true, ConfigErrorKind::TelNbrMdtRtd)?;
        cdev_offsets.push((u16::from(tel_no) << 12) | offset);
    }

    // Step 4: master-produced connections, in order, stamping S-0-1050.x.3.
    for &conn_idx in &groups.master_produced {
        let len = connections[conn_idx as usize].payload_len;
        let (tel_no, offset) = cursor.reserve(Field::Rtd, len, true, ConfigErrorKind::TelNbrMdtRtd)?;
        connections[conn_idx as usize].assigned = Assigned {
            telegram_no: tel_no,
            byte_offset: offset,
        };
    }

    Ok((cursor.finish(), svc_offsets, cdev_offsets))
}

/// Lays out the AT pass (§4.3 "AT pass").
///
/// Per the Open-Question resolution recorded in SPEC_FULL.md, per-slave
/// S-DEV words are placed *after* the remaining slave-produced data, not
/// before — matching the testable property in spec §8 scenario 1 rather
/// than the step-5-before-step-6 prose ordering.
pub fn pack_at(
    slaves: &[Slave],
    connections: &mut [Connection],
    groups: &AtConnectionGroups,
    options: &PackerOptions,
) -> Result<(Vec<TelegramLayout>, Vec<u16>, Vec<u16>, [Option<u16>; MAX_TEL]), CoreError> {
    let mut cursor = Cursor::new(options.hotplug_in_all_telegrams);

    // Step 1: HP in AT0 only.
    cursor.add(Field::Hp, HP_FIELD_LEN as u16);

    // Step 2: per-slave SVC slot -> S-0-1014.
    let mut svc_offsets = Vec::with_capacity(slaves.len());
    for _slave in slaves {
        let (tel_no, offset) = cursor.reserve(Field::Svc, SVC_SLOT_LEN as u16, true, ConfigErrorKind::TelNbrAtRtd)?;
        svc_offsets.push((u16::from(tel_no) << 12) | offset);
    }

    let mut place_conn_list = |cursor: &mut Cursor, list: &[u16], connections: &mut [Connection], field: Field| -> Result<(), CoreError> {
        for &conn_idx in list {
            let len = connections[conn_idx as usize].payload_len;
            let (tel_no, offset) = cursor.reserve(field, len, true, ConfigErrorKind::TelNbrAtRtd)?;
            connections[conn_idx as usize].assigned = Assigned {
                telegram_no: tel_no,
                byte_offset: offset,
            };
        }
        Ok(())
    };

    // Step 3: CC consumed by master, then CC not consumed by master.
    place_conn_list(&mut cursor, &groups.cc_consumed_by_master, connections, Field::CcM)?;
    place_conn_list(&mut cursor, &groups.cc_not_consumed_by_master, connections, Field::Cc)?;

    // Step 4: master-produced connections.
    place_conn_list(&mut cursor, &groups.master_produced, connections, Field::Rtd)?;

    // Step 6 (ahead of step 5; see doc comment above): remaining
    // slave-produced non-CC connections.
    place_conn_list(&mut cursor, &groups.slave_produced_non_cc, connections, Field::Rtd)?;

    // Step 5: per-slave S-DEV slot -> S-0-1011, placed last.
    let mut sdev_offsets = Vec::with_capacity(slaves.len());
    let mut last_slave_per_at: [Option<u16>; MAX_TEL] = [None; MAX_TEL];
    for slave in slaves {
        let (tel_no, offset) = cursor.reserve(Field::Rtd, SDEV_SLOT_LEN as u16, true, ConfigErrorKind::TelNbrAtRtd)?;
        sdev_offsets.push((u16::from(tel_no) << 12) | offset);
        last_slave_per_at[tel_no as usize] = Some(slave.index);
    }

    Ok((cursor.finish(), svc_offsets, sdev_offsets, last_slave_per_at))
}

/// Runs the full Connection Packer: plausibility check, MDT pass, AT pass.
pub fn pack(
    connections: &mut [Connection],
    configurations: &[Configuration],
    slaves: &[Slave],
    master: &MasterParticipant,
    tscyc_ns: u32,
    mdt_groups: &MdtConnectionGroups,
    at_groups: &AtConnectionGroups,
    options: &PackerOptions,
) -> Result<PackResult, CoreError> {
    plausibility_check(connections, configurations, slaves, master, tscyc_ns, options.master_may_produce_at)?;

    let (mdt_layouts, svc_mdt_s_0_1013, cdev_s_0_1009) = pack_mdt(slaves, connections, mdt_groups, options)?;
    let (at_layouts, svc_at_s_0_1014, sdev_s_0_1011, last_slave_per_at) =
        pack_at(slaves, connections, at_groups, options)?;

    Ok(PackResult {
        mdt_layouts,
        at_layouts,
        svc_mdt_s_0_1013,
        cdev_s_0_1009,
        svc_at_s_0_1014,
        sdev_s_0_1011,
        last_slave_per_at,
    })
}

/// The per-cycle "who produces now" bitmap, keyed by a TSref counter
/// (§4.3 "Producer-cycle bitmap").
#[derive(Debug, Clone)]
pub struct ProducerCycleBitmap {
    /// `TSrefList[i]` is the bitmask of producer-cycle slots active at
    /// `TSref == i`.
    pub tsref_list: Vec<u16>,
    pub tsref_max: u32,
    /// Effective period (ns) assigned to each bit, sorted ascending.
    pub periods_ns: Vec<u32>,
}

impl ProducerCycleBitmap {
    /// Bit index assigned to a given effective period, if any.
    pub fn slot_for_period(&self, period_ns: u32) -> Option<u8> {
        self.periods_ns.iter().position(|&p| p == period_ns).map(|i| i as u8)
    }

    /// Whether a connection with `produced` bitmask produces at `tsref`.
    pub fn produces_at(&self, produced: u16, tsref: u32) -> bool {
        produced & self.tsref_list[tsref as usize] != 0
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: u32, b: u32) -> u32 {
    a / gcd(a, b) * b
}

/// Computes the producer-cycle bitmap from the distinct `producer_cycle_ns`
/// values across `connections`, per the Open-Question resolution that
/// `producer_cycle_ns == 0` is uniformly "every cycle" (same bit as
/// `producer_cycle_ns == tscyc_ns`).
pub fn compute_producer_cycle_bitmap(
    connections: &[Connection],
    tscyc_ns: u32,
) -> Result<ProducerCycleBitmap, CoreError> {
    let mut periods: Vec<u32> = vec![tscyc_ns];
    for conn in connections {
        let period = if conn.producer_cycle_ns == 0 {
            tscyc_ns
        } else {
            conn.producer_cycle_ns
        };
        if !periods.contains(&period) {
            periods.push(period);
        }
    }
    periods.sort_unstable();

    if periods.len() > 16 {
        return Err(CoreError::config(
            ConfigErrorKind::TooManyProducerCycletimes,
            ErrorLocation::none(),
        ));
    }

    let ratios: Vec<u32> = periods.iter().map(|&p| p / tscyc_ns).collect();
    let tsref_max = ratios.iter().copied().fold(1u32, lcm) - 1;

    let mut tsref_list = vec![0u16; (tsref_max + 1) as usize];
    for (i, slot) in tsref_list.iter_mut().enumerate() {
        for (k, &ratio) in ratios.iter().enumerate() {
            if (i as u32) % ratio == 0 {
                *slot |= 1 << k;
            }
        }
    }

    Ok(ProducerCycleBitmap {
        tsref_list,
        tsref_max,
        periods_ns: periods,
    })
}

/// Resolves the `produced` bitmask for one connection (one bit set).
pub fn produced_bitmask(bitmap: &ProducerCycleBitmap, conn: &Connection, tscyc_ns: u32) -> u16 {
    let period = if conn.producer_cycle_ns == 0 {
        tscyc_ns
    } else {
        conn.producer_cycle_ns
    };
    match bitmap.slot_for_period(period) {
        Some(bit) => 1u16 << bit,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SlaveConnectionEntry;

    fn slave_with_entry(index: u16, connection_index: u16, configuration_index: u16) -> Slave {
        let mut slave = Slave::new(index, 1 + index, 1_000);
        slave.connections.push(SlaveConnectionEntry {
            connection_index,
            configuration_index,
            rt_bits_index: 0,
        });
        slave
    }

    #[test]
    fn scenario_1_single_slave_line() {
        let mut connections = vec![
            Connection::new(1, Direction::Mdt, 16, 0),
            Connection::new(2, Direction::At, 16, 0),
        ];
        let configurations = vec![
            Configuration {
                connection_index: 0,
                role: Role::Consumer,
                rt_bits_index: 0,
                capability_index: 0,
                consumed_by_master: false,
            },
            Configuration {
                connection_index: 1,
                role: Role::Producer,
                rt_bits_index: 0,
                capability_index: 0,
                consumed_by_master: true,
            },
            // Every connection needs both a producer and a consumer
            // (plausibility check, lines 154-178): the master produces
            // connection 0 (MDT) and consumes connection 1 (AT).
            Configuration {
                connection_index: 0,
                role: Role::Producer,
                rt_bits_index: 0,
                capability_index: 0,
                consumed_by_master: false,
            },
            Configuration {
                connection_index: 1,
                role: Role::Consumer,
                rt_bits_index: 0,
                capability_index: 0,
                consumed_by_master: true,
            },
        ];
        let slaves = vec![slave_with_entry(0, 1, 1)];
        let master = MasterParticipant {
            connections: vec![
                SlaveConnectionEntry {
                    connection_index: 0,
                    configuration_index: 2,
                    rt_bits_index: 0,
                },
                SlaveConnectionEntry {
                    connection_index: 1,
                    configuration_index: 3,
                    rt_bits_index: 0,
                },
            ],
        };

        let mdt_groups = MdtConnectionGroups {
            master_produced: vec![0],
        };
        let at_groups = AtConnectionGroups {
            cc_consumed_by_master: vec![],
            cc_not_consumed_by_master: vec![],
            master_produced: vec![],
            slave_produced_non_cc: vec![1],
        };
        let options = PackerOptions::default();

        let result = pack(
            &mut connections,
            &configurations,
            &slaves,
            &master,
            1_000_000,
            &mdt_groups,
            &at_groups,
            &options,
        )
        .unwrap();

        assert_eq!(result.mdt_layouts[0].tel(), 40);
        assert_eq!(result.at_layouts[0].tel(), 40);
        // C-DEV offset == hp(6) + ef(4) + svc(6) == 16.
        assert_eq!(result.cdev_s_0_1009[0] & 0xFFF, 16);
        // S-DEV offset == hp(6) + svc(6) + slave-produced(16) == 28.
        assert_eq!(result.sdev_s_0_1011[0] & 0xFFF, 28);
        assert_eq!(connections[1].assigned, Assigned { telegram_no: 0, byte_offset: 12 });
    }

    #[test]
    fn scenario_3_producer_cycle_bitmap() {
        let connections = vec![
            Connection::new(1, Direction::Mdt, 2, 0),
            Connection::new(2, Direction::At, 2, 4_000_000),
        ];
        let bitmap = compute_producer_cycle_bitmap(&connections, 1_000_000).unwrap();
        assert_eq!(bitmap.tsref_max, 3);
        let slow_bit = bitmap.slot_for_period(4_000_000).unwrap();
        assert_eq!(1u16 << slow_bit, 0b10);
        assert_eq!(bitmap.tsref_list, vec![0b11, 0b01, 0b01, 0b01]);
    }

    #[test]
    fn duplicate_connection_number_rejected() {
        let connections = vec![
            Connection::new(1, Direction::Mdt, 2, 0),
            Connection::new(1, Direction::At, 2, 0),
        ];
        let configurations = vec![
            Configuration {
                connection_index: 0,
                role: Role::Producer,
                rt_bits_index: 0,
                capability_index: 0,
                consumed_by_master: false,
            },
            Configuration {
                connection_index: 1,
                role: Role::Producer,
                rt_bits_index: 0,
                capability_index: 0,
                consumed_by_master: false,
            },
        ];
        let err = plausibility_check(&connections, &configurations, &[], &MasterParticipant::default(), 1_000_000, false)
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::config(ConfigErrorKind::NoUniqueConnNbr, ErrorLocation::none())
        );
    }

    #[test]
    fn slave_producing_in_mdt_rejected() {
        let connections = vec![Connection::new(1, Direction::Mdt, 2, 0)];
        let configurations = vec![Configuration {
            connection_index: 0,
            role: Role::Producer,
            rt_bits_index: 0,
            capability_index: 0,
            consumed_by_master: false,
        }];
        let slaves = vec![slave_with_entry(0, 0, 0)];
        let err = plausibility_check(&connections, &configurations, &slaves, &MasterParticipant::default(), 1_000_000, false)
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::config(ConfigErrorKind::SlaveProduceInMdt, ErrorLocation::connection(0, 0))
        );
    }
}
