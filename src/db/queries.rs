use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use crate::models::{
    Booking, BookingPartLine, BookingServiceLine, BookingStatus, BusyRange, Customer, Diagnosis,
    InventoryLevel, Mechanic, Part, Service, ServiceKind, ServicePartMapping, TransitionEvent,
    TransitionKind, Vehicle, WorkShift,
};

const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const BOOKING_COLS: &str = "id, customer_id, vehicle_id, mechanic_id, start_dt, end_dt, status, \
     notes_customer, notes_mechanic, stock_deducted, total_services, total_parts, total_amount, \
     created_at, updated_at";

// ── Customers / Mechanics / Vehicles ──

pub fn insert_customer(conn: &Connection, name: &str, phone: Option<&str>) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO customers (name, phone) VALUES (?1, ?2)",
        params![name, phone],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_customer(conn: &Connection, id: i64) -> anyhow::Result<Option<Customer>> {
    let result = conn.query_row(
        "SELECT id, name, phone FROM customers WHERE id = ?1",
        params![id],
        |row| {
            Ok(Customer {
                id: row.get(0)?,
                name: row.get(1)?,
                phone: row.get(2)?,
            })
        },
    );

    match result {
        Ok(customer) => Ok(Some(customer)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn insert_mechanic(conn: &Connection, name: &str) -> anyhow::Result<i64> {
    conn.execute("INSERT INTO mechanics (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn get_mechanic(conn: &Connection, id: i64) -> anyhow::Result<Option<Mechanic>> {
    let result = conn.query_row(
        "SELECT id, name, is_active FROM mechanics WHERE id = ?1",
        params![id],
        |row| {
            Ok(Mechanic {
                id: row.get(0)?,
                name: row.get(1)?,
                is_active: row.get::<_, i64>(2)? != 0,
            })
        },
    );

    match result {
        Ok(mechanic) => Ok(Some(mechanic)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn insert_vehicle(
    conn: &Connection,
    customer_id: i64,
    plate_no: &str,
    brand: Option<&str>,
    model: Option<&str>,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO vehicles (customer_id, plate_no, brand, model) VALUES (?1, ?2, ?3, ?4)",
        params![customer_id, plate_no, brand, model],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_vehicle(conn: &Connection, id: i64) -> anyhow::Result<Option<Vehicle>> {
    let result = conn.query_row(
        "SELECT id, customer_id, plate_no, brand, model FROM vehicles WHERE id = ?1",
        params![id],
        |row| {
            Ok(Vehicle {
                id: row.get(0)?,
                customer_id: row.get(1)?,
                plate_no: row.get(2)?,
                brand: row.get(3)?,
                model: row.get(4)?,
            })
        },
    );

    match result {
        Ok(vehicle) => Ok(Some(vehicle)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Services ──

pub fn insert_service(
    conn: &Connection,
    name: &str,
    kind: ServiceKind,
    default_duration_min: Option<i64>,
    base_price: Decimal,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO services (name, kind, default_duration_min, base_price) VALUES (?1, ?2, ?3, ?4)",
        params![name, kind.as_str(), default_duration_min, base_price.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_service(conn: &Connection, id: i64) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        "SELECT id, name, kind, default_duration_min, base_price, is_active
         FROM services WHERE id = ?1",
        params![id],
        |row| Ok(parse_service_row(row)),
    );

    match result {
        Ok(service) => Ok(Some(service?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fetches active services matching `ids`. Missing or inactive ids are simply
/// absent from the result; callers diff against the request to report them.
pub fn get_services_by_ids(conn: &Connection, ids: &[i64]) -> anyhow::Result<Vec<Service>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT id, name, kind, default_duration_min, base_price, is_active
         FROM services WHERE is_active = 1 AND id IN ({placeholders}) ORDER BY id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_service_row(row)))?;

    let mut services = vec![];
    for row in rows {
        services.push(row??);
    }
    Ok(services)
}

// ── Parts ──

pub fn insert_part(
    conn: &Connection,
    name: &str,
    sku: &str,
    unit: &str,
    price: Decimal,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO parts (name, sku, unit, price) VALUES (?1, ?2, ?3, ?4)",
        params![name, sku, unit, price.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_part(conn: &Connection, id: i64) -> anyhow::Result<Option<Part>> {
    let result = conn.query_row(
        "SELECT id, name, sku, unit, price, is_active FROM parts WHERE id = ?1",
        params![id],
        |row| Ok(parse_part_row(row)),
    );

    match result {
        Ok(part) => Ok(Some(part?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_parts_by_ids(conn: &Connection, ids: &[i64]) -> anyhow::Result<Vec<Part>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT id, name, sku, unit, price, is_active FROM parts WHERE id IN ({placeholders}) ORDER BY id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_part_row(row)))?;

    let mut parts = vec![];
    for row in rows {
        parts.push(row??);
    }
    Ok(parts)
}

pub fn missing_part_ids(conn: &Connection, ids: &[i64]) -> anyhow::Result<Vec<i64>> {
    let found: Vec<i64> = get_parts_by_ids(conn, ids)?.iter().map(|p| p.id).collect();
    Ok(ids.iter().copied().filter(|id| !found.contains(id)).collect())
}

// ── Service part defaults ──

pub fn service_part_exists(
    conn: &Connection,
    service_id: i64,
    part_id: i64,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM service_parts WHERE service_id = ?1 AND part_id = ?2",
        params![service_id, part_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_service_part(
    conn: &Connection,
    service_id: i64,
    part_id: i64,
    qty_per_service: i64,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO service_parts (service_id, part_id, qty_per_service) VALUES (?1, ?2, ?3)",
        params![service_id, part_id, qty_per_service],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_service_parts(
    conn: &Connection,
    service_id: Option<i64>,
) -> anyhow::Result<Vec<ServicePartMapping>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match service_id {
        Some(id) => (
            "SELECT id, service_id, part_id, qty_per_service FROM service_parts
             WHERE service_id = ?1 ORDER BY id ASC"
                .to_string(),
            vec![Box::new(id) as Box<dyn rusqlite::types::ToSql>],
        ),
        None => (
            "SELECT id, service_id, part_id, qty_per_service FROM service_parts ORDER BY id ASC"
                .to_string(),
            vec![],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok(ServicePartMapping {
            id: row.get(0)?,
            service_id: row.get(1)?,
            part_id: row.get(2)?,
            qty_per_service: row.get(3)?,
        })
    })?;

    let mut mappings = vec![];
    for row in rows {
        mappings.push(row?);
    }
    Ok(mappings)
}

pub fn delete_service_part(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM service_parts WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Default part demand of a booking's quick-service lines, `(part_id, qty)`
/// with the per-service quantity already multiplied by the line quantity.
pub fn get_quick_default_parts(
    conn: &Connection,
    booking_id: i64,
) -> anyhow::Result<Vec<(i64, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT sp.part_id, sp.qty_per_service * bs.qty
         FROM booking_services bs
         JOIN services s ON s.id = bs.service_id AND s.kind = 'QUICK'
         JOIN service_parts sp ON sp.service_id = bs.service_id
         WHERE bs.booking_id = ?1
         ORDER BY sp.part_id ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut parts = vec![];
    for row in rows {
        parts.push(row?);
    }
    Ok(parts)
}

// ── Inventory ──

pub fn get_stock_qty(conn: &Connection, part_id: i64) -> anyhow::Result<Option<i64>> {
    let result = conn.query_row(
        "SELECT qty FROM inventory WHERE part_id = ?1",
        params![part_id],
        |row| row.get(0),
    );

    match result {
        Ok(qty) => Ok(Some(qty)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn deduct_stock(conn: &Connection, part_id: i64, qty: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE inventory SET qty = qty - ?1, updated_at = datetime('now') WHERE part_id = ?2",
        params![qty, part_id],
    )?;
    Ok(())
}

pub fn add_stock(conn: &Connection, part_id: i64, qty: i64) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO inventory (part_id, qty) VALUES (?1, ?2)
         ON CONFLICT(part_id) DO UPDATE SET
           qty = inventory.qty + excluded.qty,
           updated_at = datetime('now')",
        params![part_id, qty],
    )?;
    Ok(())
}

pub fn set_stock(conn: &Connection, part_id: i64, qty: i64, min_qty: i64) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO inventory (part_id, qty, min_qty) VALUES (?1, ?2, ?3)
         ON CONFLICT(part_id) DO UPDATE SET
           qty = excluded.qty,
           min_qty = excluded.min_qty,
           updated_at = datetime('now')",
        params![part_id, qty, min_qty],
    )?;
    Ok(())
}

pub fn list_stock_levels(conn: &Connection) -> anyhow::Result<Vec<InventoryLevel>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.sku, COALESCE(i.qty, 0), COALESCE(i.min_qty, 0)
         FROM parts p
         LEFT JOIN inventory i ON i.part_id = p.id
         WHERE p.is_active = 1
         ORDER BY p.id ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        let qty: i64 = row.get(3)?;
        let min_qty: i64 = row.get(4)?;
        Ok(InventoryLevel {
            part_id: row.get(0)?,
            part_name: row.get(1)?,
            sku: row.get(2)?,
            qty,
            min_qty,
            low: qty <= min_qty,
        })
    })?;

    let mut levels = vec![];
    for row in rows {
        levels.push(row?);
    }
    Ok(levels)
}

// ── Work shifts ──

pub fn insert_workshift(
    conn: &Connection,
    mechanic_id: i64,
    work_date: &NaiveDate,
    start_min: i64,
    end_min: i64,
    step_min: i64,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO workshifts (mechanic_id, work_date, start_min, end_min, step_min)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![mechanic_id, fmt_date(work_date), start_min, end_min, step_min],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_workshift(conn: &Connection, id: i64) -> anyhow::Result<Option<WorkShift>> {
    let result = conn.query_row(
        "SELECT id, mechanic_id, work_date, start_min, end_min, step_min
         FROM workshifts WHERE id = ?1",
        params![id],
        |row| Ok(parse_shift_row(row)),
    );

    match result {
        Ok(shift) => Ok(Some(shift?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_workshift(conn: &Connection, shift: &WorkShift) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE workshifts SET mechanic_id = ?1, work_date = ?2, start_min = ?3, end_min = ?4, step_min = ?5
         WHERE id = ?6",
        params![
            shift.mechanic_id,
            fmt_date(&shift.work_date),
            shift.start_min,
            shift.end_min,
            shift.step_min,
            shift.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn delete_workshift(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM workshifts WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn list_workshifts(
    conn: &Connection,
    mechanic_id: Option<i64>,
    date_from: Option<&NaiveDate>,
    date_to: Option<&NaiveDate>,
) -> anyhow::Result<Vec<WorkShift>> {
    let mut conditions: Vec<String> = vec![];
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(mechanic_id) = mechanic_id {
        params_vec.push(Box::new(mechanic_id));
        conditions.push(format!("mechanic_id = ?{}", params_vec.len()));
    }
    if let Some(from) = date_from {
        params_vec.push(Box::new(fmt_date(from)));
        conditions.push(format!("work_date >= ?{}", params_vec.len()));
    }
    if let Some(to) = date_to {
        params_vec.push(Box::new(fmt_date(to)));
        conditions.push(format!("work_date <= ?{}", params_vec.len()));
    }

    let where_sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT id, mechanic_id, work_date, start_min, end_min, step_min
         FROM workshifts{where_sql} ORDER BY work_date ASC, mechanic_id ASC, start_min ASC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_shift_row(row)))?;

    let mut shifts = vec![];
    for row in rows {
        shifts.push(row??);
    }
    Ok(shifts)
}

pub fn get_mechanic_shifts_on_date(
    conn: &Connection,
    mechanic_id: i64,
    work_date: &NaiveDate,
    exclude_shift: Option<i64>,
) -> anyhow::Result<Vec<WorkShift>> {
    let mut stmt = conn.prepare(
        "SELECT id, mechanic_id, work_date, start_min, end_min, step_min
         FROM workshifts
         WHERE mechanic_id = ?1 AND work_date = ?2 AND (?3 IS NULL OR id != ?3)
         ORDER BY start_min ASC",
    )?;

    let rows = stmt.query_map(
        params![mechanic_id, fmt_date(work_date), exclude_shift],
        |row| Ok(parse_shift_row(row)),
    )?;

    let mut shifts = vec![];
    for row in rows {
        shifts.push(row??);
    }
    Ok(shifts)
}

pub fn get_shifts_on_date(
    conn: &Connection,
    work_date: &NaiveDate,
    mechanic_id: Option<i64>,
) -> anyhow::Result<Vec<WorkShift>> {
    let mut stmt = conn.prepare(
        "SELECT id, mechanic_id, work_date, start_min, end_min, step_min
         FROM workshifts
         WHERE work_date = ?1 AND (?2 IS NULL OR mechanic_id = ?2)
         ORDER BY mechanic_id ASC, start_min ASC",
    )?;

    let rows = stmt.query_map(params![fmt_date(work_date), mechanic_id], |row| {
        Ok(parse_shift_row(row))
    })?;

    let mut shifts = vec![];
    for row in rows {
        shifts.push(row??);
    }
    Ok(shifts)
}

// ── Bookings ──

pub fn insert_booking(
    conn: &Connection,
    customer_id: i64,
    vehicle_id: Option<i64>,
    mechanic_id: Option<i64>,
    start: &NaiveDateTime,
    end: Option<&NaiveDateTime>,
    notes_customer: Option<&str>,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO bookings (customer_id, vehicle_id, mechanic_id, start_dt, end_dt, notes_customer)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            customer_id,
            vehicle_id,
            mechanic_id,
            fmt_dt(start),
            end.map(fmt_dt),
            notes_customer,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_booking(conn: &Connection, id: i64) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_customer_bookings(conn: &Connection, customer_id: i64) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLS} FROM bookings WHERE customer_id = ?1 ORDER BY start_dt DESC"
    ))?;

    let rows = stmt.query_map(params![customer_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Open jobs assigned to a mechanic, soonest first.
pub fn list_mechanic_bookings(conn: &Connection, mechanic_id: i64) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLS} FROM bookings
         WHERE mechanic_id = ?1
           AND status IN ('PENDING', 'APPROVED', 'IN_DIAGNOSIS', 'IN_PROGRESS')
         ORDER BY start_dt ASC"
    ))?;

    let rows = stmt.query_map(params![mechanic_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn admin_list_bookings(
    conn: &Connection,
    status: Option<BookingStatus>,
    mechanic_id: Option<i64>,
    date_from: Option<&NaiveDate>,
    date_to: Option<&NaiveDate>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<(Vec<Booking>, i64)> {
    let mut conditions: Vec<String> = vec![];
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(status) = status {
        params_vec.push(Box::new(status.as_str().to_string()));
        conditions.push(format!("status = ?{}", params_vec.len()));
    }
    if let Some(mechanic_id) = mechanic_id {
        params_vec.push(Box::new(mechanic_id));
        conditions.push(format!("mechanic_id = ?{}", params_vec.len()));
    }
    if let Some(from) = date_from {
        params_vec.push(Box::new(fmt_dt(&from.and_time(NaiveTime::MIN))));
        conditions.push(format!("start_dt >= ?{}", params_vec.len()));
    }
    if let Some(to) = date_to {
        let day_after = to.and_time(NaiveTime::MIN) + Duration::days(1);
        params_vec.push(Box::new(fmt_dt(&day_after)));
        conditions.push(format!("start_dt < ?{}", params_vec.len()));
    }

    let where_sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let total: i64 = {
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM bookings{where_sql}"),
            params_refs.as_slice(),
            |row| row.get(0),
        )?
    };

    params_vec.push(Box::new(limit));
    let limit_idx = params_vec.len();
    params_vec.push(Box::new(offset));
    let offset_idx = params_vec.len();

    let sql = format!(
        "SELECT {BOOKING_COLS} FROM bookings{where_sql}
         ORDER BY start_dt DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok((bookings, total))
}

/// Busy ranges of a mechanic's blocking bookings that can intersect the given
/// window. Rows with a NULL end are returned with `end: None` so the caller
/// can apply the configured fallback duration.
pub fn get_busy_ranges(
    conn: &Connection,
    mechanic_id: i64,
    window_start: &NaiveDateTime,
    window_end: &NaiveDateTime,
    exclude_booking: Option<i64>,
) -> anyhow::Result<Vec<BusyRange>> {
    let mut stmt = conn.prepare(
        "SELECT id, start_dt, end_dt FROM bookings
         WHERE mechanic_id = ?1
           AND status IN ('PENDING', 'APPROVED', 'IN_DIAGNOSIS', 'IN_PROGRESS')
           AND start_dt < ?3
           AND (end_dt IS NULL OR end_dt > ?2)
           AND (?4 IS NULL OR id != ?4)
         ORDER BY start_dt ASC",
    )?;

    let rows = stmt.query_map(
        params![
            mechanic_id,
            fmt_dt(window_start),
            fmt_dt(window_end),
            exclude_booking
        ],
        |row| {
            let booking_id: i64 = row.get(0)?;
            let start_str: String = row.get(1)?;
            let end_str: Option<String> = row.get(2)?;
            Ok((booking_id, start_str, end_str))
        },
    )?;

    let mut ranges = vec![];
    for row in rows {
        let (booking_id, start_str, end_str) = row?;
        ranges.push(BusyRange {
            booking_id,
            start: parse_dt(&start_str)?,
            end: end_str.as_deref().map(parse_dt).transpose()?,
        });
    }
    Ok(ranges)
}

pub fn set_booking_status(
    conn: &Connection,
    id: i64,
    status: BookingStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(count > 0)
}

pub fn set_booking_mechanic(
    conn: &Connection,
    id: i64,
    mechanic_id: i64,
    end: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET mechanic_id = ?1, end_dt = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![mechanic_id, fmt_dt(end), id],
    )?;
    Ok(count > 0)
}

pub fn set_booking_end_status(
    conn: &Connection,
    id: i64,
    end: &NaiveDateTime,
    status: BookingStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET end_dt = ?1, status = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![fmt_dt(end), status.as_str(), id],
    )?;
    Ok(count > 0)
}

pub fn set_booking_started(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'IN_PROGRESS', stock_deducted = 1, updated_at = datetime('now')
         WHERE id = ?1",
        params![id],
    )?;
    Ok(count > 0)
}

pub fn set_booking_totals_done(
    conn: &Connection,
    id: i64,
    total_services: Decimal,
    total_parts: Decimal,
    total_amount: Decimal,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'DONE', total_services = ?1, total_parts = ?2, total_amount = ?3,
         updated_at = datetime('now') WHERE id = ?4",
        params![
            total_services.to_string(),
            total_parts.to_string(),
            total_amount.to_string(),
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn set_booking_canceled(
    conn: &Connection,
    id: i64,
    notes_mechanic: Option<&str>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'CANCELED', notes_mechanic = COALESCE(?1, notes_mechanic),
         updated_at = datetime('now') WHERE id = ?2",
        params![notes_mechanic, id],
    )?;
    Ok(count > 0)
}

// ── Booking lines ──

pub fn insert_booking_service(
    conn: &Connection,
    booking_id: i64,
    service_id: i64,
    qty: i64,
    price_snapshot: Decimal,
    duration_snapshot_min: Option<i64>,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO booking_services (booking_id, service_id, qty, price_snapshot, duration_snapshot_min)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            booking_id,
            service_id,
            qty,
            price_snapshot.to_string(),
            duration_snapshot_min,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_booking_service_lines(
    conn: &Connection,
    booking_id: i64,
) -> anyhow::Result<Vec<BookingServiceLine>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, service_id, qty, price_snapshot, duration_snapshot_min
         FROM booking_services WHERE booking_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| Ok(parse_service_line_row(row)))?;

    let mut lines = vec![];
    for row in rows {
        lines.push(row??);
    }
    Ok(lines)
}

pub fn insert_booking_part(
    conn: &Connection,
    booking_id: i64,
    part_id: i64,
    qty: i64,
    price_snapshot: Decimal,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO booking_parts (booking_id, part_id, qty, price_snapshot)
         VALUES (?1, ?2, ?3, ?4)",
        params![booking_id, part_id, qty, price_snapshot.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_booking_part_lines(
    conn: &Connection,
    booking_id: i64,
) -> anyhow::Result<Vec<BookingPartLine>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, part_id, qty, price_snapshot
         FROM booking_parts WHERE booking_id = ?1 ORDER BY part_id ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| Ok(parse_part_line_row(row)))?;

    let mut lines = vec![];
    for row in rows {
        lines.push(row??);
    }
    Ok(lines)
}

// ── Diagnoses ──

pub fn get_diagnosis(conn: &Connection, booking_id: i64) -> anyhow::Result<Option<Diagnosis>> {
    let result = conn.query_row(
        "SELECT id, booking_id, note, eta_min, labor_est_min, required_parts, created_at, updated_at
         FROM diagnoses WHERE booking_id = ?1",
        params![booking_id],
        |row| Ok(parse_diagnosis_row(row)),
    );

    match result {
        Ok(diagnosis) => Ok(Some(diagnosis?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn insert_diagnosis(
    conn: &Connection,
    booking_id: i64,
    note: Option<&str>,
    eta_min: Option<i64>,
    labor_est_min: Option<i64>,
    required_parts_json: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO diagnoses (booking_id, note, eta_min, labor_est_min, required_parts)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![booking_id, note, eta_min, labor_est_min, required_parts_json],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_diagnosis(
    conn: &Connection,
    booking_id: i64,
    note: Option<&str>,
    eta_min: Option<i64>,
    labor_est_min: Option<i64>,
    required_parts_json: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE diagnoses SET note = ?1, eta_min = ?2, labor_est_min = ?3, required_parts = ?4,
         updated_at = datetime('now') WHERE booking_id = ?5",
        params![note, eta_min, labor_est_min, required_parts_json, booking_id],
    )?;
    Ok(count > 0)
}

// ── Notifications ──

pub fn insert_notification(
    conn: &Connection,
    customer_id: i64,
    booking_id: i64,
    transition: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO notifications (customer_id, booking_id, transition) VALUES (?1, ?2, ?3)",
        params![customer_id, booking_id, transition],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_notifications_since(
    conn: &Connection,
    since_id: i64,
) -> anyhow::Result<Vec<TransitionEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, customer_id, booking_id, transition, created_at
         FROM notifications WHERE id > ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![since_id], |row| {
        let id: i64 = row.get(0)?;
        let user_id: i64 = row.get(1)?;
        let booking_id: i64 = row.get(2)?;
        let transition_str: String = row.get(3)?;
        let created_at: String = row.get(4)?;
        Ok((id, user_id, booking_id, transition_str, created_at))
    })?;

    let mut events = vec![];
    for row in rows {
        let (id, user_id, booking_id, transition_str, created_at) = row?;
        let transition = TransitionKind::parse(&transition_str).with_context(|| {
            format!("unknown transition in notifications table: {transition_str}")
        })?;
        events.push(TransitionEvent {
            id,
            user_id,
            booking_id,
            transition,
            created_at,
        });
    }
    Ok(events)
}

// ── Row parsing ──

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_str: String = row.get(4)?;
    let end_str: Option<String> = row.get(5)?;
    let status_str: String = row.get(6)?;
    let total_services_str: Option<String> = row.get(10)?;
    let total_parts_str: Option<String> = row.get(11)?;
    let total_amount_str: Option<String> = row.get(12)?;
    let created_at_str: String = row.get(13)?;
    let updated_at_str: String = row.get(14)?;

    let status = BookingStatus::parse(&status_str)
        .with_context(|| format!("unknown booking status in database: {status_str}"))?;

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        vehicle_id: row.get(2)?,
        mechanic_id: row.get(3)?,
        start_dt: parse_dt(&start_str)?,
        end_dt: end_str.as_deref().map(parse_dt).transpose()?,
        status,
        notes_customer: row.get(7)?,
        notes_mechanic: row.get(8)?,
        stock_deducted: row.get::<_, i64>(9)? != 0,
        total_services: total_services_str.as_deref().map(parse_money).transpose()?,
        total_parts: total_parts_str.as_deref().map(parse_money).transpose()?,
        total_amount: total_amount_str.as_deref().map(parse_money).transpose()?,
        created_at: parse_dt_lax(&created_at_str),
        updated_at: parse_dt_lax(&updated_at_str),
    })
}

fn parse_service_row(row: &rusqlite::Row) -> anyhow::Result<Service> {
    let kind_str: String = row.get(2)?;
    let price_str: String = row.get(4)?;

    let kind = ServiceKind::parse(&kind_str)
        .with_context(|| format!("unknown service kind in database: {kind_str}"))?;

    Ok(Service {
        id: row.get(0)?,
        name: row.get(1)?,
        kind,
        default_duration_min: row.get(3)?,
        base_price: parse_money(&price_str)?,
        is_active: row.get::<_, i64>(5)? != 0,
    })
}

fn parse_part_row(row: &rusqlite::Row) -> anyhow::Result<Part> {
    let price_str: String = row.get(4)?;

    Ok(Part {
        id: row.get(0)?,
        name: row.get(1)?,
        sku: row.get(2)?,
        unit: row.get(3)?,
        price: parse_money(&price_str)?,
        is_active: row.get::<_, i64>(5)? != 0,
    })
}

fn parse_shift_row(row: &rusqlite::Row) -> anyhow::Result<WorkShift> {
    let date_str: String = row.get(2)?;

    Ok(WorkShift {
        id: row.get(0)?,
        mechanic_id: row.get(1)?,
        work_date: parse_date(&date_str)?,
        start_min: row.get(3)?,
        end_min: row.get(4)?,
        step_min: row.get(5)?,
    })
}

fn parse_service_line_row(row: &rusqlite::Row) -> anyhow::Result<BookingServiceLine> {
    let price_str: String = row.get(4)?;

    Ok(BookingServiceLine {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        service_id: row.get(2)?,
        qty: row.get(3)?,
        price_snapshot: parse_money(&price_str)?,
        duration_snapshot_min: row.get(5)?,
    })
}

fn parse_part_line_row(row: &rusqlite::Row) -> anyhow::Result<BookingPartLine> {
    let price_str: String = row.get(4)?;

    Ok(BookingPartLine {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        part_id: row.get(2)?,
        qty: row.get(3)?,
        price_snapshot: parse_money(&price_str)?,
    })
}

fn parse_diagnosis_row(row: &rusqlite::Row) -> anyhow::Result<Diagnosis> {
    let parts_json: String = row.get(5)?;
    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;

    let required_parts = serde_json::from_str(&parts_json)
        .with_context(|| format!("invalid required_parts payload: {parts_json}"))?;

    Ok(Diagnosis {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        note: row.get(2)?,
        eta_min: row.get(3)?,
        labor_est_min: row.get(4)?,
        required_parts,
        created_at: parse_dt_lax(&created_at_str),
        updated_at: parse_dt_lax(&updated_at_str),
    })
}

pub fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FORMAT).to_string()
}

fn fmt_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_dt(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DT_FORMAT)
        .with_context(|| format!("invalid datetime in database: {s}"))
}

fn parse_dt_lax(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DT_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .with_context(|| format!("invalid date in database: {s}"))
}

fn parse_money(s: &str) -> anyhow::Result<Decimal> {
    s.parse::<Decimal>()
        .with_context(|| format!("invalid money value in database: {s}"))
}
